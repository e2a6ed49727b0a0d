use std::time::Duration;

use serde_json::Value;
use tabrelay_core::{Config, Paths};

/// Gateway base URL: explicit `--server`, else the configured host/port.
pub fn server_url(server: Option<String>, config: &Config) -> String {
    server
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.gateway.base_url())
}

pub fn load_config() -> anyhow::Result<(Paths, Config)> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    Ok((paths, config))
}

pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turn a `{success:false, error}` body into an error, passing successful bodies through.
pub fn expect_success(status: reqwest::StatusCode, body: Value) -> anyhow::Result<Value> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    anyhow::bail!("gateway returned {}: {}", status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_url_prefers_flag() {
        let config = Config::default();
        assert_eq!(server_url(Some("http://h:1/".into()), &config), "http://h:1");
        assert_eq!(server_url(None, &config), "http://127.0.0.1:18800");
        assert_eq!(server_url(Some(String::new()), &config), "http://127.0.0.1:18800");
    }

    #[test]
    fn test_expect_success() {
        let ok = expect_success(reqwest::StatusCode::OK, json!({"success": true, "tabs": []}));
        assert!(ok.is_ok());

        let err = expect_success(
            reqwest::StatusCode::CONFLICT,
            json!({"success": false, "error": "Conflict: busy"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Conflict: busy"));
    }
}
