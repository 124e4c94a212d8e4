//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::get,
    Json, Router,
};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vyper_server::backend::compiler::{CompileInput, Compiler, CompilerError, CompilerOutput};
use vyper_server::config::{EdgeConfig, TlsConfig};
use vyper_server::{EdgeServer, Shutdown};

/// How long `/slow` on the echo backend takes to answer.
pub const SLOW_RESPONSE: Duration = Duration::from_secs(3);

/// Pause between the two chunks of `/stream`.
pub const STREAM_PAUSE: Duration = Duration::from_secs(2);

/// How long a `slow` source keeps the fake compiler busy.
pub const SLOW_COMPILE: Duration = Duration::from_millis(1500);

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        seen.entry(name.to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }
    let headers: BTreeMap<String, String> = seen
        .into_iter()
        .map(|(name, values)| (name, values.join(", ")))
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_RESPONSE).await;
    "finally"
}

/// Headers at once, then the rest of the body after [`STREAM_PAUSE`].
async fn stream_body() -> Body {
    let first = stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b"first,")) });
    let second = stream::once(async {
        tokio::time::sleep(STREAM_PAUSE).await;
        Ok::<_, Infallible>(Bytes::from_static(b"second"))
    });
    Body::from_stream(first.chain(second))
}

async fn teapot() -> (StatusCode, [(&'static str, &'static str); 1], &'static str) {
    (StatusCode::IM_A_TEAPOT, [("x-backend", "teapot")], "short and stout")
}

/// Start a backend that echoes each request back as JSON.
///
/// `/slow` answers after [`SLOW_RESPONSE`]; `/stream` sends its body in two
/// chunks [`STREAM_PAUSE`] apart; `/teapot` answers 418.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/slow", get(slow))
        .route("/stream", get(stream_body))
        .route("/teapot", get(teapot))
        .fallback(echo);
    serve(app).await
}

/// Serve `app` on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Edge config pointing at `upstream`.
pub fn edge_config(upstream: SocketAddr) -> EdgeConfig {
    EdgeConfig {
        bind_address: "127.0.0.1:0".into(),
        upstream: format!("http://{}", upstream),
        ..EdgeConfig::default()
    }
}

/// Run a plain-HTTP edge server; trigger the returned `Shutdown` to stop it.
pub async fn start_edge(config: EdgeConfig) -> (SocketAddr, Shutdown) {
    run_edge(EdgeServer::new(config).unwrap()).await
}

/// Run an already configured edge server.
pub async fn run_edge(server: EdgeServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Write a self-signed certificate for `localhost`/`127.0.0.1` to a fresh
/// temp directory.
pub fn self_signed_tls() -> TlsConfig {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();

    let dir: PathBuf = std::env::temp_dir().join(format!("vyper-edge-tls-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    TlsConfig {
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Deterministic stand-in for the external compiler.
///
/// Sources containing `syntax error` yield a diagnostic at 3:4; sources
/// containing `crash` make the compiler itself fail; sources containing
/// `slow` take [`SLOW_COMPILE`].
pub struct FakeCompiler;

impl Compiler for FakeCompiler {
    fn version(&self) -> BoxFuture<'_, Result<String, CompilerError>> {
        Box::pin(async { Ok("0.4.0+fake".to_string()) })
    }

    fn compile(&self, input: CompileInput) -> BoxFuture<'_, Result<CompilerOutput, CompilerError>> {
        Box::pin(async move {
            if input.content.contains("slow") {
                tokio::time::sleep(SLOW_COMPILE).await;
            }
            if input.content.contains("syntax error") {
                return Err(CompilerError::Diagnostic {
                    message: "invalid syntax".into(),
                    line: Some(3),
                    column: Some(4),
                });
            }
            if input.content.contains("crash") {
                return Err(CompilerError::Failed {
                    status: "exit status: 101".into(),
                    stderr: "panicked".into(),
                });
            }
            Ok(CompilerOutput {
                abi: json!([{"type": "function", "name": "count"}]),
                bytecode: "0x6003".into(),
                bytecode_runtime: "0x6004".into(),
                source_map: json!("0:0:0"),
                method_identifiers: json!({"count()": "0x06661abd"}),
            })
        })
    }
}
