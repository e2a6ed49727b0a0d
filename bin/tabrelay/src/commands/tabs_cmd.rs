use serde_json::Value;
use tabrelay_storage::{read_snapshot, TrackedTab};

use super::client::{expect_success, http_client, load_config, server_url};

const LIST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// List tracked tabs from a running gateway, or from the on-disk snapshot with `offline`.
pub async fn run(server: Option<String>, offline: bool) -> anyhow::Result<()> {
    let (paths, config) = load_config()?;

    let tabs: Vec<TrackedTab> = if offline {
        let path = config.snapshot_path(&paths);
        println!("Snapshot: {}", path.display());
        read_snapshot(&path)?.opened_tabs
    } else {
        let base = server_url(server, &config);
        let resp = http_client(LIST_TIMEOUT)?
            .get(format!("{}/v1/tabs", base))
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        let body = expect_success(status, body)?;
        serde_json::from_value(body.get("tabs").cloned().unwrap_or(Value::Null))?
    };

    print_tabs(&tabs);
    Ok(())
}

fn print_tabs(tabs: &[TrackedTab]) {
    if tabs.is_empty() {
        println!("No tracked tabs.");
        return;
    }
    println!("{:<10} {:<10} {:<20} URL", "TAB", "WINDOW", "UPDATED");
    for tab in tabs {
        println!(
            "{:<10} {:<10} {:<20} {}",
            tab.tab_id,
            tab.window_id,
            tab.last_updated.format("%Y-%m-%d %H:%M:%S"),
            tab.url
        );
    }
    println!();
    println!("{} tab(s)", tabs.len());
}
