//! MCP stdio transport layer
//!
//! Newline-delimited JSON: one request per line in, one response per line out.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::mcp::McpServer;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, error_codes};
use crate::{Error, Result};

/// One decoded line of input
#[derive(Debug)]
pub enum Inbound {
    Request(JsonRpcRequest),
    /// Line that is not a JSON-RPC request; answered with a parse error
    Malformed(String),
}

/// Read the next non-blank line. `None` at EOF.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Inbound>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Protocol(format!("Failed to read MCP message: {e}")))?;
        if bytes_read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(match serde_json::from_str(trimmed) {
            Ok(request) => Inbound::Request(request),
            Err(e) => Inbound::Malformed(e.to_string()),
        }));
    }
}

/// Write a JSON-RPC response followed by a newline
pub async fn write_message<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    writer
        .write_all(&json)
        .await
        .map_err(|e| Error::Protocol(format!("Failed to write MCP response: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Protocol(format!("Failed to flush MCP response: {e}")))?;
    Ok(())
}

/// Serve requests from `reader` until EOF or cancellation
pub async fn serve<R, W>(
    server: &McpServer,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = reader;
    loop {
        let inbound = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("stdio transport cancelled");
                return Ok(());
            }
            inbound = read_message(&mut reader) => inbound?,
        };

        let response = match inbound {
            None => {
                info!("stdin closed, stopping MCP server");
                return Ok(());
            }
            Some(Inbound::Malformed(reason)) => Some(JsonRpcResponse::error(
                None,
                error_codes::PARSE_ERROR,
                format!("Parse error: {reason}"),
            )),
            Some(Inbound::Request(request)) => server.handle_message(request).await,
        };

        if let Some(response) = response {
            write_message(&mut writer, &response).await?;
        }
    }
}

/// Serve the process's stdin/stdout
pub async fn serve_stdio(server: &McpServer, cancel: CancellationToken) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(server, stdin, stdout, cancel).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn lines(output: &[u8]) -> Vec<Value> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_read_skips_blank_lines() {
        let input = "\n   \n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n";
        let mut reader = BufReader::new(input.as_bytes());
        match read_message(&mut reader).await.unwrap() {
            Some(Inbound::Request(req)) => assert_eq!(req.method, "tools/list"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_serve_session() {
        let server = McpServer::new("shipdeck-test", "0.1.0");
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        );
        let mut output = Vec::new();
        serve(
            &server,
            BufReader::new(input.as_bytes()),
            &mut output,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let responses = lines(&output);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "shipdeck-test");
        assert_eq!(responses[1]["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(responses[1]["id"], Value::Null);
        assert_eq!(responses[2]["id"], 2);
    }

    #[tokio::test]
    async fn test_serve_stops_when_cancelled() {
        let server = McpServer::new("shipdeck-test", "0.1.0");
        let (client, server_end) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut output = Vec::new();
        serve(&server, BufReader::new(server_end), &mut output, cancel)
            .await
            .unwrap();
        assert!(output.is_empty());
        drop(client);
    }
}
