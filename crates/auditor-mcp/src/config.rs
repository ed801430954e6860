//! Worker roster configuration.
//!
//! The roster is a JSON file mapping worker names to launch commands:
//!
//! ```json
//! {
//!   "workers": {
//!     "computer_info": { "command": "python3", "args": ["computer_info_server.py"] },
//!     "security": { "command": "python3", "args": ["security_server.py"] }
//!   }
//! }
//! ```
//!
//! Each worker gets its own fresh OS process; there is no shared process
//! across tool groups. Values in `env` support `${VAR}` interpolation from
//! the parent environment.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Launch configuration for one worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable to run.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bound on spawn + handshake, in seconds.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// Bound on each individual request, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            enabled: true,
            startup_timeout_secs: default_startup_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_startup_timeout_secs() -> u64 {
    15
}

fn default_call_timeout_secs() -> u64 {
    60
}

/// Top-level roster file shape.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkerConfigFile {
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
}

/// Load the worker roster from `path`.
pub fn load_worker_config(path: &Path) -> Result<BTreeMap<String, WorkerConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read worker config at {}", path.display()))?;
    let file: WorkerConfigFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid worker config at {}", path.display()))?;
    Ok(file.workers)
}

/// Replace `${VAR}` references with values from the parent environment.
/// Unset variables interpolate to the empty string.
pub fn interpolate_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if let Ok(resolved) = std::env::var(var) {
                    out.push_str(&resolved);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_worker_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "workers": {{
                    "security": {{
                        "command": "python3",
                        "args": ["security_server.py"],
                        "call_timeout_secs": 10
                    }}
                }}
            }}"#
        )
        .unwrap();

        let workers = load_worker_config(file.path()).unwrap();
        let security = &workers["security"];
        assert_eq!(security.command, "python3");
        assert_eq!(security.args, vec!["security_server.py"]);
        assert!(security.enabled);
        assert_eq!(security.call_timeout(), Duration::from_secs(10));
        assert_eq!(security.startup_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_load_worker_config_missing_file() {
        let err = load_worker_config(Path::new("/nonexistent/workers.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_interpolate_env_vars() {
        std::env::set_var("AUDITOR_TEST_TOKEN", "sekrit");
        assert_eq!(
            interpolate_env_vars("Bearer ${AUDITOR_TEST_TOKEN}"),
            "Bearer sekrit"
        );
        assert_eq!(interpolate_env_vars("no vars here"), "no vars here");
        assert_eq!(interpolate_env_vars("${AUDITOR_TEST_UNSET_VAR}"), "");
        // Unterminated reference is left untouched.
        assert_eq!(interpolate_env_vars("${BROKEN"), "${BROKEN");
    }
}
