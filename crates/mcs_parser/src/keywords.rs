/// Identifiers that precede `(` but are language keywords, not call sites
/// (spec.md §3: "Call site... excluding a fixed keyword set").
pub const KEYWORDS: &[&str] = &[
    "если",
    "иначе",
    "иначеесли",
    "конецесли",
    "пока",
    "конеццикла",
    "для",
    "каждого",
    "из",
    "цикл",
    "процедура",
    "функция",
    "конецпроцедуры",
    "конецфункции",
    "возврат",
    "прервать",
    "продолжить",
    "попытка",
    "исключение",
    "вызватьисключение",
    "новый",
    "тип",
    "типзнч",
    "неопределено",
    "истина",
    "ложь",
    "сообщить",
    "сообщениепользователю",
    "пустаястрока",
    "стршаблон",
    "насервере",
    "наклиенте",
    "насерверебезконтекста",
    "экспорт",
    "знач",
    "перем",
    "конецобласти",
    "область",
];

pub fn is_keyword(name: &str) -> bool {
    let lower = name.to_lowercase();
    KEYWORDS.contains(&lower.as_str())
}
