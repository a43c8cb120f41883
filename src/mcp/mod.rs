//! Subprocess bridge to MCP tool servers.
//!
//! Each call spawns the configured server, writes one JSON-RPC request line,
//! reads one response line and kills the child. There is no session and no
//! initialize handshake; servers that need one are out of reach.

pub mod error;
pub mod github;

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{Config, McpConfig, McpServerConfig};

pub use error::McpError;
pub use github::GithubMcpScraper;

/// Spawn `cfg`, send `request` as a single line and return the parsed
/// response line.
pub async fn call_once(
    cfg: &McpServerConfig,
    request: &Value,
    timeout: Duration,
) -> Result<Value, McpError> {
    let mut child = Command::new(&cfg.command)
        .args(&cfg.args)
        .envs(&cfg.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| McpError::SpawnFailed {
            command: cfg.command.clone(),
            source,
        })?;

    if let Some(stderr) = child.stderr.take() {
        let command = cfg.command.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %command, "{}", line);
            }
        });
    }

    let line = serde_json::to_string(request).map_err(|e| McpError::InvalidJson {
        message: e.to_string(),
    })?;
    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin not captured"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
    let mut reader = BufReader::new(stdout);
    let mut response = String::new();

    let read = tokio::time::timeout(timeout, reader.read_line(&mut response)).await;
    let _ = child.kill().await;

    match read {
        Err(_) => Err(McpError::Timeout {
            secs: timeout.as_secs(),
        }),
        Ok(Err(e)) => Err(McpError::Io(e)),
        Ok(Ok(0)) => Err(McpError::NoResponse),
        Ok(Ok(_)) => {
            let trimmed = response.trim();
            serde_json::from_str(trimmed).map_err(|e| McpError::InvalidJson {
                message: format!("{}: {}", e, trimmed),
            })
        }
    }
}

/// Calls tools on one configured MCP server.
#[derive(Debug, Clone)]
pub struct McpClient {
    server: McpServerConfig,
    timeout: Duration,
    retries: u32,
}

impl McpClient {
    pub fn new(server: McpServerConfig, config: &McpConfig) -> Self {
        Self {
            server,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            retries: config.retries,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke `tool` with `arguments`. Timeouts are retried up to the
    /// configured count; every other failure returns immediately.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        let mut attempt = 0;
        loop {
            let request = serde_json::json!({
                "jsonrpc": "2.0",
                "id": uuid::Uuid::new_v4().to_string(),
                "method": "tools/call",
                "params": { "name": tool, "arguments": arguments },
            });
            match call_once(&self.server, &request, self.timeout).await {
                Ok(response) => return unwrap_response(response),
                Err(e) if e.is_timeout() && attempt < self.retries => {
                    attempt += 1;
                    warn!(tool, attempt, "MCP call timed out, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like [`call_tool`](Self::call_tool) but folds failures into
    /// `{"error": "..."}`.
    pub async fn call_tool_or_error(&self, tool: &str, arguments: Value) -> Value {
        match self.call_tool(tool, arguments).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tool, error = %e, "MCP tool call failed");
                e.to_error_object()
            }
        }
    }
}

fn unwrap_response(response: Value) -> Result<Value, McpError> {
    if let Some(err) = response.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(McpError::Server { message });
    }
    let result = response.get("result").cloned().ok_or_else(|| McpError::Server {
        message: "Invalid response from MCP server".into(),
    })?;

    let text = result
        .get("content")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str);
    let Some(text) = text else {
        return Ok(result);
    };
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(McpError::Server {
            message: text.to_string(),
        });
    }
    Ok(serde_json::from_str(text).unwrap_or(result))
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else is a string.
pub fn parse_tool_args(args: &[String]) -> anyhow::Result<serde_json::Map<String, Value>> {
    let mut map = serde_json::Map::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Invalid --arg '{}', expected key=value", arg);
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// `crawlrag mcp call`: run one tool and print the result as JSON.
pub async fn run_mcp_call(config: &Config, server: &str, tool: &str, args: &[String]) -> anyhow::Result<()> {
    let Some(server_cfg) = config.mcp.servers.get(server) else {
        bail!("Unknown MCP server: {} (configure it under [mcp.servers.{}])", server, server);
    };
    let arguments = parse_tool_args(args)?;
    let client = McpClient::new(server_cfg.clone(), &config.mcp);
    let value = client
        .call_tool(tool, Value::Object(arguments))
        .await
        .with_context(|| format!("MCP call {}/{} failed", server, tool))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sh(script: &str) -> McpServerConfig {
        McpServerConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: HashMap::new(),
        }
    }

    fn client(server: McpServerConfig) -> McpClient {
        McpClient::new(server, &McpConfig::default()).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_request_shape() {
        let echo = sh(r#"read line; printf '{"jsonrpc":"2.0","id":"1","result":%s}\n' "$line""#);
        let result = client(echo)
            .call_tool("get_file_contents", serde_json::json!({"path": "README.md"}))
            .await
            .unwrap();
        assert_eq!(result["jsonrpc"], "2.0");
        assert_eq!(result["method"], "tools/call");
        assert_eq!(result["params"]["name"], "get_file_contents");
        assert_eq!(result["params"]["arguments"]["path"], "README.md");
        assert!(result["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_text_content_is_parsed() {
        let server = sh(
            r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":"1","result":{"content":[{"type":"text","text":"{\"items\":[1]}"}]}}'"#,
        );
        let result = client(server).call_tool("search_repositories", Value::Null).await.unwrap();
        assert_eq!(result, serde_json::json!({"items": [1]}));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_error_object() {
        let server = sh(
            r#"read line; echo '{"jsonrpc":"2.0","id":"1","error":{"code":-32601,"message":"no such tool"}}'"#,
        );
        let c = client(server);
        let err = c.call_tool("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, McpError::Server { ref message } if message == "no such tool"));
        assert_eq!(
            c.call_tool_or_error("nope", Value::Null).await,
            serde_json::json!({"error": "MCP server error: no such tool"})
        );
    }

    #[tokio::test]
    async fn test_invalid_json_and_no_response() {
        let err = client(sh("read line; echo not json"))
            .call_tool("t", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidJson { .. }));

        let err = client(sh("read line; exit 0"))
            .call_tool("t", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NoResponse));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let server = McpServerConfig {
            command: "/nonexistent/crawlrag-mcp-server".into(),
            args: Vec::new(),
            env: HashMap::new(),
        };
        let err = client(server).call_tool("t", Value::Null).await.unwrap_err();
        assert!(matches!(err, McpError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let dir = tempfile::TempDir::new().unwrap();
        let counter = dir.path().join("hits");
        let mut server = sh(r#"echo hit >> "$COUNTER"; sleep 5"#);
        server
            .env
            .insert("COUNTER".into(), counter.to_string_lossy().into_owned());

        let c = McpClient::new(server, &McpConfig::default()).with_timeout(Duration::from_millis(300));
        let err = c.call_tool("slow", Value::Null).await.unwrap_err();
        assert!(err.is_timeout());

        let hits = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(hits.lines().count(), 2);
    }

    #[test]
    fn test_parse_tool_args() {
        let args = vec!["owner=acme".to_string(), "depth=2".to_string(), "q=a=b".to_string()];
        let map = parse_tool_args(&args).unwrap();
        assert_eq!(map["owner"], "acme");
        assert_eq!(map["depth"], 2);
        assert_eq!(map["q"], "a=b");
        assert!(parse_tool_args(&["novalue".to_string()]).is_err());
    }
}
