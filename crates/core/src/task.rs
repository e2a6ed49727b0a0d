use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Browser command the remote executor knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskCommand {
    #[serde(alias = "open-tab", alias = "open_tab")]
    OpenTab,
    #[serde(alias = "close-tab", alias = "close_tab")]
    CloseTab,
    #[serde(alias = "switch-tab", alias = "switch_tab")]
    SwitchTab,
    #[serde(alias = "execute-js", alias = "execute_js")]
    ExecuteJs,
    /// Match open tabs by URL and activate the first hit.
    #[serde(alias = "find-tab", alias = "find_tab")]
    FindTab,
}

impl TaskCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCommand::OpenTab => "openTab",
            TaskCommand::CloseTab => "closeTab",
            TaskCommand::SwitchTab => "switchTab",
            TaskCommand::ExecuteJs => "executeJs",
            TaskCommand::FindTab => "findTab",
        }
    }

    fn requires_url(&self) -> bool {
        matches!(self, TaskCommand::OpenTab | TaskCommand::FindTab)
    }

    fn requires_tab(&self) -> bool {
        matches!(
            self,
            TaskCommand::CloseTab | TaskCommand::SwitchTab | TaskCommand::ExecuteJs
        )
    }
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated task, as handed to the remote executor. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub command: TaskCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_function: Option<String>,
}

/// Unvalidated submission body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub command: Option<TaskCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_function: Option<String>,
}

impl TaskRequest {
    pub fn new(command: TaskCommand) -> Self {
        Self {
            command: Some(command),
            ..Default::default()
        }
    }

    /// Parse a raw JSON body. Shape problems (unknown command, wrong types)
    /// become validation errors rather than transport rejections.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Validation("task body must be a JSON object".to_string()));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Validation(format!("invalid task body: {}", e)))
    }

    /// Check command/field shape and produce a task, generating an id if none was supplied.
    pub fn into_task(self) -> Result<Task> {
        let command = self
            .command
            .ok_or_else(|| Error::Validation("command is required".to_string()))?;

        let url = non_empty(self.url);
        let js_function = non_empty(self.js_function);

        if command.requires_url() && url.is_none() {
            return Err(Error::Validation(format!("{} requires url", command)));
        }
        if command.requires_tab() && self.tab_id.is_none() {
            return Err(Error::Validation(format!("{} requires tabId", command)));
        }
        if command == TaskCommand::ExecuteJs && js_function.is_none() {
            return Err(Error::Validation(format!("{} requires jsFunction", command)));
        }

        let task_id = non_empty(self.task_id).unwrap_or_else(new_task_id);

        Ok(Task {
            task_id,
            command,
            tab_id: self.tab_id,
            url,
            js_function,
        })
    }
}

/// Blank counts as missing; anything else is kept exactly as sent.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Millisecond timestamp plus a random suffix, unique under concurrent generation.
pub fn new_task_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("task-{}-{}", chrono::Utc::now().timestamp_millis(), &suffix[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_open_tab_without_url_is_rejected() {
        let err = TaskRequest::new(TaskCommand::OpenTab).into_task().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let blank = TaskRequest {
            url: Some("   ".to_string()),
            ..TaskRequest::new(TaskCommand::OpenTab)
        };
        assert!(matches!(blank.into_task(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_field_requirements_per_command() {
        assert!(TaskRequest::new(TaskCommand::CloseTab).into_task().is_err());
        assert!(TaskRequest::new(TaskCommand::SwitchTab).into_task().is_err());
        assert!(TaskRequest::new(TaskCommand::FindTab).into_task().is_err());

        let missing_script = TaskRequest {
            tab_id: Some(4),
            ..TaskRequest::new(TaskCommand::ExecuteJs)
        };
        assert!(missing_script.into_task().is_err());

        let ok = TaskRequest {
            tab_id: Some(4),
            js_function: Some("() => document.title".to_string()),
            ..TaskRequest::new(TaskCommand::ExecuteJs)
        };
        let task = ok.into_task().unwrap();
        assert_eq!(task.tab_id, Some(4));
        assert!(task.task_id.starts_with("task-"));
    }

    #[test]
    fn test_caller_supplied_id_is_kept() {
        let req = TaskRequest {
            task_id: Some("abc".to_string()),
            url: Some("https://example.com".to_string()),
            ..TaskRequest::new(TaskCommand::OpenTab)
        };
        assert_eq!(req.into_task().unwrap().task_id, "abc");
    }

    #[test]
    fn test_from_value_accepts_aliases_and_rejects_unknown() {
        let req = TaskRequest::from_value(&json!({"command": "switch-tab", "tabId": 3})).unwrap();
        assert_eq!(req.command, Some(TaskCommand::SwitchTab));

        let err = TaskRequest::from_value(&json!({"command": "reboot"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = TaskRequest::from_value(&json!(["openTab"])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let missing = TaskRequest::from_value(&json!({"url": "https://x"})).unwrap();
        assert!(matches!(missing.into_task(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_task_wire_format() {
        let task = Task {
            task_id: "t1".to_string(),
            command: TaskCommand::OpenTab,
            tab_id: None,
            url: Some("https://x".to_string()),
            js_function: None,
        };
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({"taskId": "t1", "command": "openTab", "url": "https://x"})
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<String> = (0..500).map(|_| new_task_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_supplied_fields_are_kept_verbatim() {
        let task = TaskRequest {
            task_id: Some(" abc ".to_string()),
            tab_id: Some(3),
            js_function: Some("  () => 1\n".to_string()),
            ..TaskRequest::new(TaskCommand::ExecuteJs)
        }
        .into_task()
        .unwrap();
        assert_eq!(task.task_id, " abc ");
        assert_eq!(task.js_function.as_deref(), Some("  () => 1\n"));

        let blank_id = TaskRequest {
            task_id: Some("  ".to_string()),
            url: Some("https://a".to_string()),
            ..TaskRequest::new(TaskCommand::OpenTab)
        };
        assert!(blank_id.into_task().unwrap().task_id.starts_with("task-"));
    }
}
