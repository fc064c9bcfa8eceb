// Scripted stand-in for the TensorFlow Deploy service.
//
// Runs a warp server on its own thread and tokio runtime so the blocking
// reqwest client under test never runs inside an async context. Replies are
// scripted per (method, path); every request is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tfd_utils::ui::FixedAnswer;
use tfd_utils::{Cursor, CursorBuilder};
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::FullPath;
use warp::Filter;

pub const TEAM: &str = "test_team";
pub const PROJECT: &str = "test_project";
pub const NAME: &str = "test_name";
pub const LABEL: &str = "test_label";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
    delay: Duration,
}

type Replies = HashMap<(String, String), VecDeque<Reply>>;

#[derive(Default)]
struct State {
    replies: Replies,
    requests: Vec<Recorded>,
}

pub struct MockTfd {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl MockTfd {
    /// Start a server that answers `/ping` and 404s everything else.
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        let shared = state.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let route = warp::method()
                    .and(warp::path::full())
                    .and(
                        warp::query::raw()
                            .or(warp::any().map(String::new))
                            .unify(),
                    )
                    .and(warp::body::bytes())
                    .and_then(move |method: Method, path: FullPath, query: String, body: Bytes| {
                        let shared = shared.clone();
                        async move {
                            let reply = answer(&shared, method.as_str(), path.as_str(), query, body);
                            if !reply.delay.is_zero() {
                                tokio::time::sleep(reply.delay).await;
                            }
                            let response = warp::http::Response::builder()
                                .status(StatusCode::from_u16(reply.status).unwrap())
                                .body(reply.body)
                                .unwrap();
                            Ok::<_, warp::Rejection>(response)
                        }
                    });
                let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
                tx.send(addr).unwrap();
                server.await;
            });
        });

        let addr = rx.recv().unwrap();
        let mock = MockTfd { addr, state };
        mock.stub("GET", "/ping", 200, "pong");
        mock
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue a reply for `method path`. Queued replies are served in order;
    /// the last one keeps being served.
    pub fn stub(&self, method: &str, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.stub_slow(method, path, status, body, Duration::ZERO);
    }

    /// Like `stub`, but the reply is only sent after `delay`.
    pub fn stub_slow(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: impl Into<Vec<u8>>,
        delay: Duration,
    ) {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(Reply {
                status,
                body: body.into(),
                delay,
            });
    }

    /// Every request seen so far, `/ping` excluded.
    pub fn requests(&self) -> Vec<Recorded> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.path != "/ping")
            .cloned()
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.path == "/ping")
            .count()
    }

    /// Builder for a cursor pointed at this server that answers "yes".
    pub fn builder(&self) -> CursorBuilder {
        Cursor::builder(TEAM, PROJECT, "127.0.0.1")
            .port(self.port())
            .name(NAME)
            .label(LABEL)
            .prompter(FixedAnswer::yes())
    }

    pub fn cursor(&self) -> Cursor {
        self.builder().build().unwrap()
    }
}

fn answer(
    state: &Mutex<State>,
    method: &str,
    path: &str,
    query: String,
    body: Bytes,
) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests.push(Recorded {
        method: method.to_string(),
        path: path.to_string(),
        query,
        body: body.to_vec(),
    });
    match state.replies.get_mut(&(method.to_string(), path.to_string())) {
        Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
        Some(queue) if !queue.is_empty() => queue[0].clone(),
        _ => Reply {
            status: 404,
            body: b"no route".to_vec(),
            delay: Duration::ZERO,
        },
    }
}

pub fn models_path(tail: &str) -> String {
    format!("/v1/models/{}/{}/names/{}/{}", TEAM, PROJECT, NAME, tail)
}

pub fn modules_path(tail: &str) -> String {
    if tail.is_empty() {
        format!("/v1/modules/{}/{}/names/{}", TEAM, PROJECT, NAME)
    } else {
        format!("/v1/modules/{}/{}/names/{}/{}", TEAM, PROJECT, NAME, tail)
    }
}

pub fn reload_path() -> String {
    format!("/v1/models/{}/{}/reload", TEAM, PROJECT)
}

pub fn config_path() -> String {
    format!("/v1/models/{}/{}/config", TEAM, PROJECT)
}

/// A directory holding a minimal SavedModel and README.
pub fn saved_model_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("saved_model.pb"), b"graph").unwrap();
    std::fs::write(dir.path().join("README.md"), b"# Model description\n").unwrap();
    std::fs::create_dir(dir.path().join("variables")).unwrap();
    std::fs::write(dir.path().join("variables").join("variables.index"), b"idx").unwrap();
    dir
}
