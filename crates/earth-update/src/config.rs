//! Update manager configuration

use serde::{Deserialize, Serialize};

/// Tunables for [`UpdateSessionManager`](crate::UpdateSessionManager)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Progress reported when a session enters `installing`
    #[serde(default = "default_install_progress_start")]
    pub install_progress_start: f64,
    /// Terminal sessions kept per device as history. Values below 1 keep
    /// the most recent one.
    #[serde(default = "default_retain_terminal_sessions")]
    pub retain_terminal_sessions: usize,
}

fn default_install_progress_start() -> f64 {
    50.0
}

fn default_retain_terminal_sessions() -> usize {
    32
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            install_progress_start: default_install_progress_start(),
            retain_terminal_sessions: default_retain_terminal_sessions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: UpdateConfig = serde_json::from_str(r#"{"retain_terminal_sessions": 4}"#).unwrap();
        assert_eq!(config.install_progress_start, 50.0);
        assert_eq!(config.retain_terminal_sessions, 4);
    }
}
