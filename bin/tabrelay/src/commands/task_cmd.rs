use serde_json::Value;
use tabrelay_core::TaskRequest;

use super::client::{expect_success, http_client, load_config, server_url};

/// Submit one task to a running gateway and block until the executor reports.
pub async fn submit(request: TaskRequest, server: Option<String>) -> anyhow::Result<()> {
    let (_paths, config) = load_config()?;
    // Validate locally so obvious mistakes never reach the queue.
    let task = request.clone().into_task()?;
    let base = server_url(server, &config);

    // The gateway holds the request until the task settles; leave headroom past its deadline.
    let client = http_client(config.dispatch.task_timeout() + std::time::Duration::from_secs(5))?;

    println!("→ {} {} via {}", task.command, task.task_id, base);
    let mut body = serde_json::to_value(&request)?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("taskId".to_string(), Value::String(task.task_id.clone()));
    }

    let resp = client
        .post(format!("{}/v1/tasks", base))
        .json(&body)
        .send()
        .await?;
    let status = resp.status();
    let body: Value = resp.json().await?;
    let body = expect_success(status, body)?;

    let result = body.get("result").cloned().unwrap_or(Value::Null);
    println!("✓ {} completed", task.task_id);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
