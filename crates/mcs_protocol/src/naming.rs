use std::collections::HashSet;
use std::path::Path;

/// Derive a project name from a path's basename.
///
/// Returns `None` if no basename can be derived (e.g. root or empty path).
pub fn derive_base_name(project_path: &Path) -> Option<String> {
    let trimmed = project_path
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .to_string();
    let trimmed_path = Path::new(&trimmed);
    trimmed_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

/// Derive a unique project name given a base name and the set of names already in use.
///
/// `base`, then `base_2`, `base_3`, ... — never `base_1` (spec.md §8 Name derivation law).
pub fn unique_name(base: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    let mut counter: u64 = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_base_name_strips_trailing_slash() {
        assert_eq!(
            derive_base_name(Path::new("/x/proj/")),
            Some("proj".to_string())
        );
    }

    #[test]
    fn unique_name_first_collision_is_base_2_never_base_1() {
        let mut existing = HashSet::new();
        existing.insert("proj".to_string());
        assert_eq!(unique_name("proj", &existing), "proj_2");
    }

    #[test]
    fn unique_name_sequence_has_no_gaps() {
        let mut existing = HashSet::new();
        existing.insert("proj".to_string());
        existing.insert("proj_2".to_string());
        existing.insert("proj_3".to_string());
        assert_eq!(unique_name("proj", &existing), "proj_4");
    }

    #[test]
    fn unique_name_no_collision_returns_base() {
        let existing = HashSet::new();
        assert_eq!(unique_name("proj", &existing), "proj");
    }
}
