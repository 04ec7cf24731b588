//! The seam between a running server and request dispatch.
//!
//! Exactly one [`FrontDoor`] is installed per server instance. It receives
//! every request under the context path together with a [`DispatchContext`],
//! and it is the [`SessionEventSink`] for the instance's session store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use dynhttp_config::ServerOptions;
use parking_lot::Mutex;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::connector::{ListenerInfo, TransportKind};
use crate::session::{SessionEventSink, SessionStore};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "DYNHTTPSESSIONID";

pub const SERVICE_VENDOR: &str = "dynhttp";
pub const SERVICE_DESCRIPTION: &str = "Dynamically configured HTTP server";

// ─────────────────────────────────────────────────────────────────────────────
// Init parameters
// ─────────────────────────────────────────────────────────────────────────────

/// What the front door is told about the instance it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub pid: String,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub https_host: Option<String>,
    pub https_port: Option<u16>,
    pub context_path: String,
    pub workspace_dir: PathBuf,
    pub other_info: Option<String>,
    pub vendor: &'static str,
    pub description: &'static str,
}

impl InitParams {
    pub fn new(options: &ServerOptions, listeners: &[ListenerInfo], workspace_dir: &Path) -> Self {
        let find = |kind: TransportKind| listeners.iter().find(|l| l.kind == kind);
        let plain = find(TransportKind::Plain);
        let tls = find(TransportKind::Tls);

        Self {
            pid: options.pid.clone(),
            http_host: plain.map(ListenerInfo::advertised_host),
            http_port: plain.map(ListenerInfo::port),
            https_host: tls.map(ListenerInfo::advertised_host),
            https_port: tls.map(ListenerInfo::port),
            context_path: options.context.path.clone(),
            workspace_dir: workspace_dir.to_path_buf(),
            other_info: options.other_info.clone(),
            vendor: SERVICE_VENDOR,
            description: SERVICE_DESCRIPTION,
        }
    }

    /// Flat key/value view, using the same names as the configuration keys
    /// where one exists.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        if let (Some(host), Some(port)) = (&self.http_host, self.http_port) {
            map.insert("http.host", host.clone());
            map.insert("http.port", port.to_string());
        }
        if let (Some(host), Some(port)) = (&self.https_host, self.https_port) {
            map.insert("https.host", host.clone());
            map.insert("https.port", port.to_string());
        }
        map.insert("context.path", self.context_path.clone());
        map.insert("context.tempdir", self.workspace_dir.display().to_string());
        if let Some(info) = &self.other_info {
            map.insert("other.info", info.clone());
        }
        map.insert("service.vendor", self.vendor.to_string());
        map.insert("service.description", self.description.to_string());
        map
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrontDoor
// ─────────────────────────────────────────────────────────────────────────────

/// The single request handler of a running instance.
pub trait FrontDoor: SessionEventSink + 'static {
    /// Called once before any listener accepts. An error aborts the start.
    fn init(&self, _params: &InitParams) -> Result<(), BoxError> {
        Ok(())
    }

    /// Handle one request under the context path.
    fn service(
        &self,
        ctx: DispatchContext,
        request: Request,
    ) -> impl std::future::Future<Output = Response> + Send;

    /// Called once after the listeners have stopped and sessions are gone.
    fn destroy(&self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// DispatchContext
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SessionSlot {
    id: Option<String>,
    /// The cookie must be (re)sent or expired on the response.
    dirty: bool,
}

/// Per-request execution context handed to [`FrontDoor::service`].
#[derive(Clone)]
pub struct DispatchContext {
    params: Arc<InitParams>,
    listener: Arc<ListenerInfo>,
    sessions: Arc<SessionStore>,
    path_info: Arc<str>,
    request_host: Option<Arc<str>>,
    session: Arc<Mutex<SessionSlot>>,
}

impl DispatchContext {
    pub fn params(&self) -> &InitParams {
        &self.params
    }

    /// The listener the request arrived on.
    pub fn listener(&self) -> &ListenerInfo {
        &self.listener
    }

    /// Request path relative to the context path; empty for the context
    /// root itself.
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn workspace(&self) -> &Path {
        &self.params.workspace_dir
    }

    pub fn is_secure(&self) -> bool {
        self.listener.kind == TransportKind::Tls
    }

    /// Id of the request's live session, if any.
    pub fn session_id(&self) -> Option<String> {
        let slot = self.session.lock();
        slot.id.clone().filter(|id| self.sessions.contains(id))
    }

    /// The request's session, created when missing and `create` is set.
    pub fn session(&self, create: bool) -> Option<String> {
        let mut slot = self.session.lock();
        if let Some(id) = slot.id.as_ref().filter(|id| self.sessions.contains(id)) {
            return Some(id.clone());
        }
        if !create {
            return None;
        }
        let id = self.sessions.create();
        slot.id = Some(id.clone());
        slot.dirty = true;
        Some(id)
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        let id = self.session_id()?;
        self.sessions.attribute(&id, name)
    }

    /// Store a session attribute, creating the session if needed.
    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        if let Some(id) = self.session(true) {
            self.sessions.set_attribute(&id, name, value);
        }
    }

    /// Invalidate the request's session and expire its cookie.
    pub fn invalidate_session(&self) -> bool {
        let mut slot = self.session.lock();
        let Some(id) = slot.id.take() else {
            return false;
        };
        slot.dirty = true;
        drop(slot);
        self.sessions.invalidate(&id)
    }

    /// Give the request's session a fresh id.
    pub fn change_session_id(&self) -> Option<String> {
        let mut slot = self.session.lock();
        let old = slot.id.clone()?;
        let new = self.sessions.change_id(&old)?;
        slot.id = Some(new.clone());
        slot.dirty = true;
        Some(new)
    }

    /// Absolute URL of `path` on the secure listener, when the request came
    /// in on a plain listener that has one alongside.
    pub fn secure_url(&self, path: &str) -> Option<String> {
        let redirect = self.listener.secure_redirect.as_ref()?;
        let host = match &self.request_host {
            Some(host) => host.to_string(),
            None => self.listener.advertised_host(),
        };
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host
        };
        Some(format!("{}://{host}:{}{path}", redirect.scheme, redirect.port))
    }

    fn set_cookie_header(&self) -> Option<String> {
        let slot = self.session.lock();
        if !slot.dirty {
            return None;
        }
        let secure = if self.is_secure() { "; Secure" } else { "" };
        let path = &self.params.context_path;
        Some(match &slot.id {
            Some(id) => format!("{SESSION_COOKIE}={id}; Path={path}; HttpOnly{secure}"),
            None => format!("{SESSION_COOKIE}=; Path={path}; Max-Age=0; HttpOnly{secure}"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

struct DispatchState<F: FrontDoor> {
    front_door: Arc<F>,
    params: Arc<InitParams>,
    listener: Arc<ListenerInfo>,
    sessions: Arc<SessionStore>,
}

/// Router for one listener: every path goes to the front door.
pub fn router<F: FrontDoor>(
    front_door: Arc<F>,
    params: Arc<InitParams>,
    listener: ListenerInfo,
    sessions: Arc<SessionStore>,
) -> Router {
    let state = Arc::new(DispatchState {
        front_door,
        params,
        listener: Arc::new(listener),
        sessions,
    });
    Router::new()
        .fallback(dispatch::<F>)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch<F: FrontDoor>(
    State(state): State<Arc<DispatchState<F>>>,
    request: Request,
) -> Response {
    let Some(path_info) = path_info(&state.params.context_path, request.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let session_id = session_cookie(request.headers()).filter(|id| state.sessions.touch(id));
    let request_host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| Arc::from(strip_port(h)));

    let ctx = DispatchContext {
        params: state.params.clone(),
        listener: state.listener.clone(),
        sessions: state.sessions.clone(),
        path_info: Arc::from(path_info),
        request_host,
        session: Arc::new(Mutex::new(SessionSlot {
            id: session_id,
            dirty: false,
        })),
    };

    let mut response = state.front_door.service(ctx.clone(), request).await;

    if let Some(cookie) = ctx.set_cookie_header() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unrepresentable session cookie: {e}"),
        }
    }
    response
}

/// Path below `context`, or `None` when `path` is outside it.
fn path_info<'a>(context: &str, path: &'a str) -> Option<&'a str> {
    if context == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(context)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, _)) => name,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::SecureRedirect;
    use crate::session::NoopSessionEvents;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use dynhttp_config::{ConfigurationSnapshot, Keys};
    use tower::ServiceExt;

    struct Echo;

    impl SessionEventSink for Echo {}

    impl FrontDoor for Echo {
        async fn service(&self, ctx: DispatchContext, request: Request) -> Response {
            match ctx.path_info() {
                "/login" => {
                    ctx.set_attribute("user", Value::from("ada"));
                }
                "/logout" => {
                    ctx.invalidate_session();
                }
                _ => {}
            }
            format!("{} {}", request.method(), ctx.path_info()).into_response()
        }
    }

    fn plain_listener(secure_port: Option<u16>) -> ListenerInfo {
        ListenerInfo {
            kind: TransportKind::Plain,
            host: None,
            local_addr: "127.0.0.1:8080".parse().unwrap(),
            idle_timeout: None,
            secure_redirect: secure_port.map(|port| SecureRedirect { scheme: "https", port }),
        }
    }

    fn params(context: &str) -> InitParams {
        let options = ServerOptions::from_snapshot(
            &ConfigurationSnapshot::new("pid.a")
                .with(Keys::CONTEXT_PATH, context)
                .with(Keys::OTHER_INFO, "x"),
        )
        .unwrap();
        InitParams::new(&options, &[plain_listener(None)], Path::new("/work/pid_0"))
    }

    fn app(context: &str) -> (Router, Arc<SessionStore>) {
        let sessions = Arc::new(SessionStore::new(None, Arc::new(NoopSessionEvents)));
        let router = router(
            Arc::new(Echo),
            Arc::new(params(context)),
            plain_listener(None),
            sessions.clone(),
        );
        (router, sessions)
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn path_info_matching() {
        assert_eq!(path_info("/", "/a/b"), Some("/a/b"));
        assert_eq!(path_info("/app", "/app"), Some(""));
        assert_eq!(path_info("/app", "/app/hello"), Some("/hello"));
        assert_eq!(path_info("/app", "/application"), None);
        assert_eq!(path_info("/app", "/other"), None);
    }

    #[test]
    fn cookie_and_host_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; DYNHTTPSESSIONID=abc ; b=2"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc"));
        assert_eq!(strip_port("example.test:8080"), "example.test");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("example.test"), "example.test");
    }

    #[test]
    fn init_params_map() {
        let map = params("/app").to_map();
        assert_eq!(map["http.port"], "8080");
        assert_eq!(map["http.host"], "127.0.0.1");
        assert_eq!(map["context.path"], "/app");
        assert_eq!(map["context.tempdir"], "/work/pid_0");
        assert_eq!(map["other.info"], "x");
        assert_eq!(map["service.vendor"], SERVICE_VENDOR);
        assert!(!map.contains_key("https.port"));
    }

    #[test]
    fn secure_url_uses_request_host() {
        let ctx = DispatchContext {
            params: Arc::new(params("/")),
            listener: Arc::new(plain_listener(Some(8443))),
            sessions: Arc::new(SessionStore::new(None, Arc::new(NoopSessionEvents))),
            path_info: Arc::from("/"),
            request_host: Some(Arc::from("example.test")),
            session: Arc::new(Mutex::new(SessionSlot::default())),
        };
        assert_eq!(
            ctx.secure_url("/login").as_deref(),
            Some("https://example.test:8443/login")
        );
    }

    #[tokio::test]
    async fn requests_outside_context_are_not_found() {
        let (app, _) = app("/app");
        let response = app
            .oneshot(HttpRequest::get("/elsewhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_cookie_round_trip() {
        let (app, sessions) = app("/app");

        let response = app
            .clone()
            .oneshot(HttpRequest::get("/app/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("DYNHTTPSESSIONID="));
        assert!(cookie.contains("Path=/app"));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(body(response).await, "GET /login");
        assert_eq!(sessions.len(), 1);

        let pair = cookie.split(';').next().unwrap().to_string();
        let response = app
            .clone()
            .oneshot(
                HttpRequest::get("/app/other")
                    .header(header::COOKIE, &pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = app
            .oneshot(
                HttpRequest::get("/app/logout")
                    .header(header::COOKIE, &pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let expired = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(expired.contains("Max-Age=0"));
        assert!(sessions.is_empty());
    }
}
