use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One entry of a full-state resync push from the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub tab_id: i64,
    pub window_id: i64,
    #[serde(default)]
    pub url: String,
}

impl TabRecord {
    /// Parse a resync list. Anything other than an array of well-formed records is rejected.
    pub fn list_from_value(value: &Value) -> Result<Vec<TabRecord>> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::Validation("tabs must be an array".to_string()))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<TabRecord>(item.clone())
                    .map_err(|e| Error::Validation(format!("tabs[{}]: {}", i, e)))
            })
            .collect()
    }
}

/// Tab state carried by a task result or an ambient event.
///
/// `closedTabId` requests a removal; `tabId` + `windowId` request an upsert.
/// A move event omits `url`, in which case the stored url is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabReport {
    #[serde(default)]
    pub closed_tab_id: Option<i64>,
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(default)]
    pub window_id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl TabReport {
    /// Extract the tab-bearing fields from an arbitrary result payload.
    /// Returns `None` when the payload carries no tab identity at all.
    pub fn from_value(data: &Value) -> Option<TabReport> {
        let obj = data.as_object()?;
        let int = |key: &str| obj.get(key).and_then(Value::as_i64);
        let report = TabReport {
            closed_tab_id: int("closedTabId"),
            tab_id: int("tabId"),
            window_id: int("windowId"),
            url: obj.get("url").and_then(Value::as_str).map(str::to_string),
        };
        if report.closed_tab_id.is_none() && report.upsert().is_none() {
            return None;
        }
        Some(report)
    }

    /// `(tabId, windowId)` when both are present.
    pub fn upsert(&self) -> Option<(i64, i64)> {
        Some((self.tab_id?, self.window_id?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_open_and_close() {
        let open = TabReport::from_value(&json!({"tabId": 5, "windowId": 1, "url": "https://x"})).unwrap();
        assert_eq!(open.upsert(), Some((5, 1)));
        assert_eq!(open.url.as_deref(), Some("https://x"));

        let closed = TabReport::from_value(&json!({"closedTabId": 5})).unwrap();
        assert_eq!(closed.closed_tab_id, Some(5));
        assert_eq!(closed.upsert(), None);
    }

    #[test]
    fn test_report_without_identity() {
        assert!(TabReport::from_value(&json!({"result": "done"})).is_none());
        assert!(TabReport::from_value(&json!({"tabId": 5})).is_none());
        assert!(TabReport::from_value(&json!("ok")).is_none());
        assert!(TabReport::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_resync_list_validation() {
        let tabs = TabRecord::list_from_value(&json!([
            {"tabId": 1, "windowId": 1, "url": "a"},
            {"tabId": 2, "windowId": 1}
        ]))
        .unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[1].url, "");

        assert!(TabRecord::list_from_value(&json!({"tabId": 1})).is_err());
        let err = TabRecord::list_from_value(&json!([{"tabId": "one", "windowId": 1}])).unwrap_err();
        assert!(err.to_string().contains("tabs[0]"));
    }
}
