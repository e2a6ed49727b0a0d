use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    /// Resolve the base directory: `$TABRELAY_HOME` if set, else `~/.tabrelay`.
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os("TABRELAY_HOME").filter(|v| !v.is_empty()) {
            return Self { base: PathBuf::from(home) };
        }
        let base = dirs::home_dir()
            .map(|h| h.join(".tabrelay"))
            .unwrap_or_else(|| PathBuf::from(".tabrelay"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base.join("state")
    }

    pub fn tabs_snapshot_file(&self) -> PathBuf {
        self.state_dir().join("tabs.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.state_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let paths = Paths::with_base(PathBuf::from("/tmp/relay"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/relay/config.json"));
        assert_eq!(
            paths.tabs_snapshot_file(),
            PathBuf::from("/tmp/relay/state/tabs.json")
        );
    }
}
