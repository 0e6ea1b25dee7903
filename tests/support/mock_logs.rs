use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A `fetchEvents` call as seen by the mock service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFetch {
    pub group: String,
    pub stream: String,
    pub token: Option<String>,
}

/// In-memory log groups; a stream's continuation token is the decimal index of
/// the next unread event.
#[derive(Clone, Default)]
pub struct MockLogStore {
    inner: Arc<RwLock<MockLogStoreInner>>,
}

#[derive(Default)]
struct MockLogStoreInner {
    groups: BTreeMap<String, BTreeMap<String, Vec<(i64, String)>>>,
    fetches: Vec<RecordedFetch>,
    authorization: Vec<String>,
    regions: Vec<String>,
    request_targets: Vec<String>,
}

impl MockLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, group: &str, stream: &str, timestamp_millis: i64, message: &str) {
        let mut inner = self.inner.write().expect("mock store poisoned");
        inner
            .groups
            .entry(group.to_owned())
            .or_default()
            .entry(stream.to_owned())
            .or_default()
            .push((timestamp_millis, message.to_owned()));
    }

    pub fn fetches(&self) -> Vec<RecordedFetch> {
        self.inner.read().expect("mock store poisoned").fetches.clone()
    }

    pub fn authorization_headers(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("mock store poisoned")
            .authorization
            .clone()
    }

    pub fn region_headers(&self) -> Vec<String> {
        self.inner.read().expect("mock store poisoned").regions.clone()
    }

    /// Request-line targets in arrival order. Calls relayed by a forward proxy
    /// carry the absolute URL of the upstream endpoint.
    pub fn request_targets(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("mock store poisoned")
            .request_targets
            .clone()
    }

    fn record_headers(&self, req: &Request<Body>) {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let mut inner = self.inner.write().expect("mock store poisoned");
        inner.request_targets.push(req.uri().to_string());
        if let Some(auth) = header("authorization") {
            inner.authorization.push(auth);
        }
        if let Some(region) = header("x-streamtail-region") {
            inner.regions.push(region);
        }
    }

    fn list_groups(&self) -> Value {
        let inner = self.inner.read().expect("mock store poisoned");
        json!(inner.groups.keys().collect::<Vec<_>>())
    }

    fn list_streams(&self, group: &str) -> Option<Value> {
        let inner = self.inner.read().expect("mock store poisoned");
        inner
            .groups
            .get(group)
            .map(|streams| json!(streams.keys().collect::<Vec<_>>()))
    }

    fn fetch_events(&self, group: &str, stream: &str, token: Option<String>) -> Option<Value> {
        let mut inner = self.inner.write().expect("mock store poisoned");
        inner.fetches.push(RecordedFetch {
            group: group.to_owned(),
            stream: stream.to_owned(),
            token: token.clone(),
        });

        let events = inner.groups.get(group)?.get(stream)?;
        let start = token
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0)
            .min(events.len());
        let page: Vec<Value> = events[start..]
            .iter()
            .map(|(timestamp, message)| json!({"timestamp": timestamp, "message": message}))
            .collect();

        Some(json!({
            "events": page,
            "nextToken": events.len().to_string(),
        }))
    }
}

pub struct MockLogServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockLogServer {
    pub async fn start(store: MockLogStore) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock log listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let store = store.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(store.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock log server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(store: MockLogStore, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    store.record_headers(&req);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = handle_call(&store, payload);
    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(store: &MockLogStore, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let string_param = |index: usize| params.get(index).and_then(Value::as_str).map(str::to_owned);

    match method.as_str() {
        "listGroups" => success(id, store.list_groups()),
        "listStreams" => match string_param(0).and_then(|group| store.list_streams(&group)) {
            Some(streams) => success(id, streams),
            None => error(id, -32001, "log group not found"),
        },
        "fetchEvents" => {
            let (Some(group), Some(stream)) = (string_param(0), string_param(1)) else {
                return error(id, -32602, "fetchEvents expects group and stream");
            };
            match store.fetch_events(&group, &stream, string_param(2)) {
                Some(page) => success(id, page),
                None => error(id, -32002, "log stream not found"),
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
