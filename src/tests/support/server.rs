// Fake orchestration server for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const DIID: &str = "1234-abcd";
pub const AUTH_COOKIE: &str = "com.sixsq.slipstream.cookie";

/// One request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: Method,
    /// Path and query.
    pub target: String,
    pub authorization: bool,
    pub cookie: bool,
    pub body: String,
}

/// Mutable state of the fake run.
#[derive(Debug, Default)]
pub struct RunState {
    /// Global states in order; `:complete` moves to the next one.
    pub states: Vec<String>,
    pub current: usize,
    /// Ignore `:complete`, the state never moves.
    pub frozen: bool,
    /// Runtime parameters; `None` is an unset value (412).
    pub params: HashMap<String, Option<String>>,
    pub abort: String,
    pub document: String,
    pub user: String,
    /// Uploaded reports: file name and size.
    pub reports: Vec<(String, usize)>,
    pub completes: usize,
    pub deleted: bool,
    /// Canned replies served before normal routing, one per request.
    pub replies: VecDeque<(u16, &'static str)>,
    /// Hand out an auth cookie on successful replies.
    pub issue_cookie: bool,
    /// Reply 401 to requests carrying the auth cookie.
    pub reject_cookie: bool,
    /// Image ids PUT on image resources, as (path, id).
    pub images: Vec<(String, String)>,
    /// Path to redirect status and `Location`.
    pub redirects: HashMap<String, (u16, String)>,
    pub hits: Vec<Hit>,
}

impl RunState {
    fn state(&self) -> String {
        self.states.get(self.current).cloned().unwrap_or_default()
    }
}

pub struct FakeServer {
    addr: String,
    state: Arc<Mutex<RunState>>,
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeServer {
    pub async fn start(initial: RunState) -> Self {
        let state = Arc::new(Mutex::new(initial));
        let shared = state.clone();

        let handler = move |req: Request| {
            let state = shared.clone();
            async move { handle(state, req).await }
        };
        let app = Router::new().fallback(handler);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            handle,
            shutdown: Some(tx),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, RunState> {
        self.state.lock()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.lock().hits.clone()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.state.lock().params.get(key).cloned().flatten()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

async fn handle(state: Arc<Mutex<RunState>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let target = if query.is_empty() { path.clone() } else { format!("{path}?{query}") };
    let headers = req.headers().clone();
    let bytes = to_bytes(req.into_body(), usize::MAX).await.unwrap_or_default();
    let body = String::from_utf8_lossy(&bytes).to_string();

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(AUTH_COOKIE));

    let mut st = state.lock();
    st.hits.push(Hit {
        method: method.clone(),
        target,
        authorization: headers.contains_key(header::AUTHORIZATION),
        cookie,
        body: body.clone(),
    });

    if cookie && st.reject_cookie {
        return (StatusCode::UNAUTHORIZED, "").into_response();
    }
    if let Some((code, location)) = st.redirects.get(&path) {
        let status = StatusCode::from_u16(*code).unwrap();
        return (status, [(header::LOCATION, location.clone())], "").into_response();
    }
    if let Some((code, text)) = st.replies.pop_front() {
        let status = StatusCode::from_u16(code).unwrap();
        return (status, text.to_string()).into_response();
    }

    let ignore_abort = query.contains("ignoreabort=true");
    let (status, text) = route(&mut st, &method, &path, ignore_abort, body);

    let mut resp = (status, text).into_response();
    if st.issue_cookie && status.is_success() {
        resp.headers_mut().insert(
            header::SET_COOKIE,
            format!("{AUTH_COOKIE}=token-1; Path=/").parse().unwrap(),
        );
    }
    resp
}

fn route(st: &mut RunState, method: &Method, path: &str, ignore_abort: bool, body: String) -> (StatusCode, String) {
    let run = format!("/run/{DIID}");
    let reports = format!("/reports/{DIID}/");

    if path == run {
        return match *method {
            Method::GET => (StatusCode::OK, st.document.clone()),
            Method::DELETE => {
                st.deleted = true;
                (StatusCode::NO_CONTENT, String::new())
            }
            _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
        };
    }
    if let Some(name) = path.strip_prefix(&reports) {
        st.reports.push((name.to_string(), body.len()));
        return (StatusCode::OK, String::new());
    }
    if path.starts_with("/module/") && *method == Method::PUT {
        st.images.push((path.to_string(), body.clone()));
        return (StatusCode::OK, body);
    }
    if path.starts_with("/user/") {
        return (StatusCode::OK, st.user.clone());
    }
    let Some(key) = path.strip_prefix(&format!("{run}/")) else {
        return (StatusCode::NOT_FOUND, String::new());
    };

    if key.ends_with(":complete") && *method == Method::POST {
        st.completes += 1;
        if !st.frozen && st.current + 1 < st.states.len() {
            st.current += 1;
        }
        return (StatusCode::OK, String::new());
    }
    match key {
        "ss:state" => return (StatusCode::OK, st.state()),
        "ss:abort" if *method == Method::GET => return (StatusCode::OK, st.abort.clone()),
        "ss:abort" => {
            if !st.abort.is_empty() && !ignore_abort {
                return (StatusCode::CONFLICT, format!("<error>{}</error>", st.abort));
            }
            st.abort = body.clone();
            return (StatusCode::OK, body);
        }
        _ => {}
    }

    if !st.abort.is_empty() && !ignore_abort {
        return (StatusCode::CONFLICT, format!("<error>{}</error>", st.abort));
    }
    match *method {
        Method::GET => match st.params.get(key) {
            Some(Some(value)) => (StatusCode::OK, value.clone()),
            Some(None) => (StatusCode::PRECONDITION_FAILED, format!("<error>{key} not yet set</error>")),
            None => (StatusCode::NOT_FOUND, String::new()),
        },
        Method::PUT => {
            st.params.insert(key.to_string(), Some(body.clone()));
            (StatusCode::OK, body)
        }
        _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
    }
}
