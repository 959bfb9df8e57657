//! Runtime configuration loaded from the process environment.
//!
//! The binary layers CLI flags on top of this snapshot; library users can
//! build an `AppCfg` directly.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::error::{CardError, CardResult};

/// Default sleep between mailbox polls while idle.
pub const DEFAULT_POLL_INTERVAL_US: u64 = 200;

/// Identifiers of the three models shared by every entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalModelIds {
    pub base_encoder: String,
    pub ordered_layer: String,
    pub output_head: String,
}

impl Default for GlobalModelIds {
    fn default() -> Self {
        Self {
            base_encoder: "base_encoder_v1".to_string(),
            ordered_layer: "ordered_layer_v1".to_string(),
            output_head: "output_head_v1".to_string(),
        }
    }
}

impl GlobalModelIds {
    /// All ids in load order.
    pub fn all(&self) -> [&str; 3] {
        [&self.base_encoder, &self.ordered_layer, &self.output_head]
    }
}

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub ipc_path: Option<PathBuf>,
    pub poll_interval_us: u64,
    pub log_level: u8,
    pub log_json: bool,
    pub query_cmd: Option<String>,
    pub models: GlobalModelIds,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            ipc_path: None,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            log_level: 1,
            log_json: false,
            query_cmd: None,
            models: GlobalModelIds::default(),
        }
    }
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let models = GlobalModelIds {
            base_encoder: non_empty("CARDEST_BASE_ENCODER_ID")
                .unwrap_or(defaults.models.base_encoder),
            ordered_layer: non_empty("CARDEST_ORDERED_LAYER_ID")
                .unwrap_or(defaults.models.ordered_layer),
            output_head: non_empty("CARDEST_OUTPUT_HEAD_ID")
                .unwrap_or(defaults.models.output_head),
        };

        Self {
            data_root: non_empty("CARDEST_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            ipc_path: non_empty("CARDEST_IPC_PATH").map(PathBuf::from),
            poll_interval_us: non_empty("CARDEST_POLL_INTERVAL_US")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.poll_interval_us),
            log_level: non_empty("CARDEST_LOG_LEVEL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.log_level),
            log_json: non_empty("CARDEST_LOG_FORMAT")
                .map(|v| v.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            query_cmd: non_empty("CARDEST_QUERY_CMD"),
            models,
        }
    }

    /// Reject values the poll loop cannot run with.
    pub fn validate(&self) -> CardResult<()> {
        if self.poll_interval_us == 0 {
            return Err(CardError::Config(
                "poll interval must be at least 1us".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn cfg_from(pairs: &[(&str, &str)]) -> AppCfg {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppCfg::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = cfg_from(&[]);
        assert_eq!(cfg.data_root, PathBuf::from("./data"));
        assert_eq!(cfg.poll_interval_us, 200);
        assert_eq!(cfg.log_level, 1);
        assert!(!cfg.log_json);
        assert!(cfg.ipc_path.is_none());
        assert_eq!(cfg.models.base_encoder, "base_encoder_v1");
        assert_eq!(cfg.models.ordered_layer, "ordered_layer_v1");
        assert_eq!(cfg.models.output_head, "output_head_v1");
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = cfg_from(&[
            ("CARDEST_DATA_ROOT", "/var/lib/cardest"),
            ("CARDEST_IPC_PATH", "/dev/shm/cardest.shm"),
            ("CARDEST_POLL_INTERVAL_US", "50"),
            ("CARDEST_LOG_FORMAT", "JSON"),
            ("CARDEST_OUTPUT_HEAD_ID", "output_head_v2"),
        ]);
        assert_eq!(cfg.data_root, PathBuf::from("/var/lib/cardest"));
        assert_eq!(cfg.ipc_path, Some(PathBuf::from("/dev/shm/cardest.shm")));
        assert_eq!(cfg.poll_interval(), Duration::from_micros(50));
        assert!(cfg.log_json);
        assert_eq!(cfg.models.output_head, "output_head_v2");
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let cfg = cfg_from(&[
            ("CARDEST_POLL_INTERVAL_US", "soon"),
            ("CARDEST_LOG_LEVEL", "loud"),
        ]);
        assert_eq!(cfg.poll_interval_us, DEFAULT_POLL_INTERVAL_US);
        assert_eq!(cfg.log_level, 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = cfg_from(&[("CARDEST_POLL_INTERVAL_US", "0")]);
        assert!(cfg.validate().is_err());
        assert!(cfg_from(&[]).validate().is_ok());
    }
}
