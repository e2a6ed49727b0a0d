use std::time::Duration;

use serde_json::Value;
use tabrelay_storage::read_snapshot;

use super::client::{http_client, load_config};

pub async fn run() -> anyhow::Result<()> {
    let (paths, config) = load_config()?;

    println!("tabrelay status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗ (not found, using defaults)" }
    );

    let snapshot_path = config.snapshot_path(&paths);
    match read_snapshot(&snapshot_path) {
        Ok(snapshot) => println!(
            "Snapshot:  {} ({} tabs, {} windows)",
            snapshot_path.display(),
            snapshot.opened_tabs.len(),
            snapshot.opened_windows.len()
        ),
        Err(e) => println!("Snapshot:  {} ✗ ({})", snapshot_path.display(), e),
    }

    println!(
        "Dispatch:  timeout {}s, executor poll every {}s",
        config.dispatch.task_timeout_secs, config.dispatch.poll_interval_secs
    );

    let base = config.gateway.base_url();
    println!();
    print!("Gateway:   {} ", base);
    let health = async {
        let resp = http_client(Duration::from_secs(3))?
            .get(format!("{}/v1/health", base))
            .send()
            .await?;
        anyhow::Ok(resp.json::<Value>().await?)
    }
    .await;

    match health {
        Ok(body) => {
            println!("✓ running");
            let field = |k: &str| body.get(k).and_then(Value::as_u64).unwrap_or(0);
            println!("  queued:   {}", field("queuedTasks"));
            println!("  waiting:  {}", field("pendingWaits"));
            println!("  tabs:     {}", field("trackedTabs"));
            println!("  windows:  {}", field("trackedWindows"));
            println!("  uptime:   {}s", field("uptimeSecs"));
        }
        Err(_) => {
            println!("✗ not reachable");
            println!();
            println!("Run `tabrelay gateway` to start it.");
        }
    }

    Ok(())
}
