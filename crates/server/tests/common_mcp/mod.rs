use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

/// Minimal MCP client for the server's streamable HTTP endpoint (`/mcp`), for tests only.
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl McpStreamableHttpSession {
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let init_resp = post_mcp(&client, &base_url, None, json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "r2r-mcp-server-integration-tests", "version": "0" }
            }
        }))
        .await?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_response(init_resp, &json!(0)).await?;
        anyhow::ensure!(
            init_msg.pointer("/result/serverInfo").is_some(),
            "initialize returned no serverInfo: {init_msg}"
        );

        let initialized_resp = post_mcp(
            &client,
            &base_url,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        let resp = post_mcp(
            &self.client,
            &self.base_url,
            Some(&self.session_id),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
        )
        .await?;

        tokio::time::timeout(timeout_dur, read_response(resp, &json!(id)))
            .await
            .context("timeout waiting for event-stream response")?
    }
}

/// Parse `result.content[0].text` of a tool call or resource read as JSON.
#[allow(dead_code)]
pub fn text_json(msg: &Value) -> anyhow::Result<Value> {
    let text = msg
        .pointer("/result/content/0/text")
        .or_else(|| msg.pointer("/result/contents/0/text"))
        .and_then(Value::as_str)
        .with_context(|| format!("no text content in {msg}"))?;
    serde_json::from_str(text).context("text content is not JSON")
}

async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    session_id: Option<&str>,
    body: Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(format!("{base_url}/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send()
        .await
        .context("POST /mcp")?
        .error_for_status()
        .context("POST /mcp status")
}

/// Read event-stream messages until the response carrying `id`; notifications are skipped.
/// The JSON-RPC message carried by an event's data, if any.
///
/// Priming events carry an empty `data:` line and are skipped.
fn event_message(data: &str) -> Option<Value> {
    if data.trim().is_empty() {
        return None;
    }
    serde_json::from_str(data).ok()
}

async fn read_response(resp: reqwest::Response, id: &Value) -> anyhow::Result<Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            if data_lines.is_empty() {
                continue;
            }
            let data = data_lines.join("\n");
            data_lines.clear();
            if let Some(msg) = event_message(&data)
                && msg.get("id") == Some(id)
            {
                return Ok(msg);
            }
            continue;
        }

        if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.trim().to_string());
        }
    }

    anyhow::bail!("event-stream ended without a response for id {id}")
}

#[test]
fn event_message_skips_empty_and_non_json_data() {
    assert_eq!(event_message(""), None);
    assert_eq!(event_message("  "), None);
    assert_eq!(event_message("retry: 3000"), None);
    let msg = event_message(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).expect("message");
    assert_eq!(msg["id"], 1);
}
