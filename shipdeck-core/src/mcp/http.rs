//! HTTP endpoint for the MCP server
//!
//! Each POST body carries one JSON-RPC request; the response body carries the
//! JSON-RPC response. Notifications are acknowledged with `202 Accepted`.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::mcp::McpServer;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, error_codes};

/// HTTP server wrapping an MCP server for tool access via HTTP POST.
pub struct HttpMcpServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HttpMcpServer {
    /// Bind `addr` and accept connections on a background task.
    ///
    /// Port 0 picks an ephemeral port; see [`local_addr()`](Self::local_addr).
    pub async fn start(server: Arc<McpServer>, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("MCP HTTP server listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, server, cancel.clone()));

        Ok(Self {
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The full URL of the running server (e.g. `http://127.0.0.1:12345`).
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("MCP HTTP accept loop ended abnormally: {}", e);
        }
    }
}

async fn accept_loop(listener: TcpListener, server: Arc<McpServer>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("MCP HTTP connection from {}", addr);
                        let server = Arc::clone(&server);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                handle_http_request(Arc::clone(&server), req)
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!("MCP HTTP connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("MCP HTTP accept error: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                debug!("MCP HTTP server shutting down");
                break;
            }
        }
    }
}

fn respond(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            warn!("Failed to build HTTP response, returning empty 500");
            let mut resp = Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
}

fn rpc_response(status: StatusCode, response: &JsonRpcResponse) -> Response<Full<Bytes>> {
    respond(status, serde_json::to_vec(response).unwrap_or_default())
}

async fn handle_http_request(
    server: Arc<McpServer>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() != hyper::Method::POST {
        let body = JsonRpcResponse::error(
            None,
            error_codes::INVALID_REQUEST,
            "Method not allowed, use POST",
        );
        return Ok(rpc_response(StatusCode::METHOD_NOT_ALLOWED, &body));
    }

    let body = req.collect().await?.to_bytes();
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let body = JsonRpcResponse::error(
                None,
                error_codes::PARSE_ERROR,
                format!("Parse error: {e}"),
            );
            return Ok(rpc_response(StatusCode::OK, &body));
        }
    };

    Ok(match server.handle_message(request).await {
        Some(response) => rpc_response(StatusCode::OK, &response),
        None => respond(StatusCode::ACCEPTED, Vec::new()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn post(addr: SocketAddr, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw
    }

    fn json_body(raw: &str) -> Value {
        let (_, body) = raw.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_start_on_ephemeral_port() {
        let server = Arc::new(McpServer::new("shipdeck-test", "0.1.0"));
        let http = HttpMcpServer::start(server, loopback()).await.unwrap();
        assert!(http.local_addr().port() > 0);
        assert!(http.url().starts_with("http://127.0.0.1:"));
        http.shutdown().await;
    }

    #[tokio::test]
    async fn test_post_initialize() {
        let server = Arc::new(McpServer::new("shipdeck-test", "0.1.0"));
        let http = HttpMcpServer::start(server, loopback()).await.unwrap();

        let raw = post(
            http.local_addr(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 200"));
        assert_eq!(json_body(&raw)["result"]["serverInfo"]["name"], "shipdeck-test");

        http.shutdown().await;
    }

    #[tokio::test]
    async fn test_post_notification_and_garbage() {
        let server = Arc::new(McpServer::new("shipdeck-test", "0.1.0"));
        let http = HttpMcpServer::start(server, loopback()).await.unwrap();

        let raw = post(
            http.local_addr(),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 202"));

        let raw = post(http.local_addr(), "{oops").await;
        assert_eq!(json_body(&raw)["error"]["code"], error_codes::PARSE_ERROR);

        http.shutdown().await;
    }
}
