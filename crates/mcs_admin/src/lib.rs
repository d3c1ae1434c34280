//! HTTP admin API and static UI (spec.md §4.8), built on axum.

pub mod assets;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AdminState;

use std::sync::Arc;

use mcs_supervisor::Supervisor;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Bind and serve the admin API until the listener errors or the process is
/// torn down (spec.md §4.8: the admin loop is a conventional HTTP server
/// thread pool per §5).
pub async fn serve(supervisor: Arc<Supervisor>, host: &str, port: u16) -> std::io::Result<()> {
    let state = AdminState { supervisor };
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "admin API listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mcs_protocol::{ProjectRegistration, Transport};
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn test_state() -> (AdminState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MCS_HOME", dir.path());
        let supervisor = Arc::new(Supervisor::new(PathBuf::from("/bin/true"), dir.path().to_path_buf()));
        (AdminState { supervisor }, dir)
    }

    #[tokio::test]
    async fn index_serves_html() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn list_servers_is_empty_initially() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/admin/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_project_action_returns_404() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/servers/ghost/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_action_returns_400() {
        let (state, _dir) = test_state();
        state
            .supervisor
            .add_server(ProjectRegistration {
                project_name: "alpha".to_string(),
                project_path: PathBuf::from("/tmp/alpha"),
                port: 9400,
                transport: Transport::Streamable,
                host: "127.0.0.1".to_string(),
                context: None,
                modes: Vec::new(),
                log_level: None,
                auto_restart: false,
            })
            .unwrap();
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/servers/alpha/frobnicate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
