//! Sample front door: answers `Hello World!` and reports what it was
//! initialised with.

use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dynhttp_transport::{BoxError, DispatchContext, FrontDoor, InitParams, SessionEventSink};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Default)]
pub struct HelloFrontDoor {
    params: RwLock<Option<InitParams>>,
}

impl HelloFrontDoor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionEventSink for HelloFrontDoor {
    fn session_destroyed(&self, id: &str) {
        debug!("Session {id} destroyed");
    }

    fn session_id_changed(&self, old_id: &str) {
        debug!("Session {old_id} renamed");
    }
}

impl FrontDoor for HelloFrontDoor {
    fn init(&self, params: &InitParams) -> Result<(), BoxError> {
        info!(
            "Front door ready for {} at {} (workspace {})",
            params.pid,
            params.context_path,
            params.workspace_dir.display()
        );
        *self.params.write() = Some(params.clone());
        Ok(())
    }

    async fn service(&self, ctx: DispatchContext, _request: Request) -> Response {
        match ctx.path_info() {
            "/hello" => "Hello World!\n".into_response(),
            "/visits" => {
                let visits = ctx
                    .attribute("visits")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    + 1;
                ctx.set_attribute("visits", Value::from(visits));
                format!("{visits}\n").into_response()
            }
            "/info" => Json(ctx.params().to_map()).into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    fn destroy(&self) {
        if let Some(params) = self.params.write().take() {
            info!("Front door for {} destroyed", params.pid);
        }
    }
}
