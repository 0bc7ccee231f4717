mod common;

use anyhow::Context as _;
use r2r_mcp_test_support::MockR2r;
use serde_json::{Value, json};
use std::io::{BufRead as _, BufReader};

use common::{KillOnDrop, spawn_stdio_server};

fn send(stdin: &mut impl std::io::Write, msg: &Value) -> anyhow::Result<()> {
    writeln!(stdin, "{}", serde_json::to_string(msg)?)?;
    stdin.flush()?;
    Ok(())
}

fn recv_response(
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    id: u64,
) -> anyhow::Result<Value> {
    for line in lines {
        let line = line.context("read stdout")?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: Value = serde_json::from_str(&line).context("stdout line is not JSON")?;
        if msg.get("id") == Some(&json!(id)) {
            return Ok(msg);
        }
    }
    anyhow::bail!("stdout closed before response {id}")
}

// The mock lives on this runtime, so the blocking stdio exchange runs on its own thread.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stdio_session_lists_prompts_and_tools() -> anyhow::Result<()> {
    let mock = MockR2r::start().await?;
    let mut child = KillOnDrop(spawn_stdio_server(&mock)?);
    let mut stdin = child.0.stdin.take().context("child stdin")?;
    let stdout = child.0.stdout.take().context("child stdout")?;

    let (prompts, tools) = tokio::task::spawn_blocking(move || -> anyhow::Result<(Value, Value)> {
        let mut lines = BufReader::new(stdout).lines();
        send(&mut stdin, &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "stdio-test", "version": "0"}
            }
        }))?;
        let init = recv_response(&mut lines, 1)?;
        anyhow::ensure!(init.pointer("/result/capabilities/prompts").is_some(), "{init}");

        send(&mut stdin, &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))?;
        send(&mut stdin, &json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/list", "params": {}}))?;
        let prompts = recv_response(&mut lines, 2)?;
        send(&mut stdin, &json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list", "params": {}}))?;
        let tools = recv_response(&mut lines, 3)?;
        Ok((prompts, tools))
    })
    .await
    .context("join stdio exchange")??;

    let prompt_names: Vec<_> = prompts
        .pointer("/result/prompts")
        .and_then(Value::as_array)
        .context("prompts")?
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(prompt_names, ["rag_query_prompt", "document_analysis_prompt"]);

    let tool_count = tools
        .pointer("/result/tools")
        .and_then(Value::as_array)
        .map(Vec::len);
    assert_eq!(tool_count, Some(10));

    Ok(())
}
