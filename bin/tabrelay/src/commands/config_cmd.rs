use tabrelay_core::Config;

use super::client::load_config;

/// Show the effective configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let (paths, config) = load_config()?;

    println!();
    println!("📋 Current Configuration");
    println!("  File: {}", paths.config_file().display());
    println!("  Snapshot: {}", config.snapshot_path(&paths).display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Write a default config file, refusing to clobber an existing one unless forced.
pub async fn init(force: bool) -> anyhow::Result<()> {
    let (paths, _) = load_config()?;
    let config_path = paths.config_file();

    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    paths.ensure_dirs()?;
    Config::default().save(&config_path)?;
    println!("✓ Wrote default config to {}", config_path.display());
    Ok(())
}
