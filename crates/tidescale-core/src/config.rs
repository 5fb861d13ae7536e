//! tidescale.toml configuration parser.
//!
//! Every field defaults to the reference deployment's constants, so an empty
//! file is a valid configuration. [`TidescaleConfig::engine_config`] validates
//! the engine sections and freezes them into an immutable [`EngineConfig`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{BandFactors, ClusterTarget, LedgerKeys, Variant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TidescaleConfig {
    pub engine: EngineSection,
    pub cluster: ClusterSection,
    pub coordinator: CoordinatorSection,
    pub placement: PlacementSection,
    pub kube: KubeSection,
    pub ledger: LedgerSection,
    pub status: StatusSection,
    pub capacity: CapacitySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub variant: Variant,
    /// Period between decision ticks.
    pub epoch: String,
    /// Wait between a scale-out and re-applying the bandwidth ceiling.
    pub settle_delay: String,
    pub initial_replicas: u32,
    pub step: u32,
    /// Per-node rate above which a reading is treated as corrupt (MB/s).
    pub sanity_ceiling: f64,
    pub basic: BasicSection,
    pub adaptive: AdaptiveSection,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            variant: Variant::Basic,
            epoch: "10s".to_string(),
            settle_delay: "8s".to_string(),
            initial_replicas: 4,
            step: 2,
            sanity_ceiling: 1000.0,
            basic: BasicSection::default(),
            adaptive: AdaptiveSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicSection {
    /// Fixed per-node ceiling (MB/s).
    pub bandwidth_limit: f64,
    pub up_bound: f64,
    pub low_bound: f64,
    pub check_scale_out_window: u32,
    pub check_balance_window: u32,
    pub history_len: usize,
}

impl Default for BasicSection {
    fn default() -> Self {
        Self {
            bandwidth_limit: 60.0,
            up_bound: 25.0,
            low_bound: 25.0,
            check_scale_out_window: 3,
            check_balance_window: 6,
            history_len: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSection {
    /// Starting per-node ceiling (MB/s).
    pub reserve_bw: f64,
    /// Smoothed demand at which the cluster scales out.
    pub reserve_bw_limit: f64,
    /// Hard cap for the per-node ceiling.
    pub scale_bw_limit: f64,
    pub low_bound: f64,
    pub check_balance_window: u32,
    pub up_history_len: usize,
    pub down_history_len: usize,
    /// Band used while active.
    pub narrow: BandFactors,
    /// Band used while cooling down after a scale-out.
    pub wide: BandFactors,
}

impl Default for AdaptiveSection {
    fn default() -> Self {
        Self {
            reserve_bw: 20.0,
            reserve_bw_limit: 30.0,
            scale_bw_limit: 120.0,
            low_bound: 30.0,
            check_balance_window: 3,
            up_history_len: 3,
            down_history_len: 5,
            narrow: BandFactors {
                up_factor: 3.0,
                up_check_factor: 2.0,
                down_check_factor: 3.5,
                down_factor: 1.5,
            },
            wide: BandFactors {
                up_factor: 4.0,
                up_check_factor: 3.5,
                down_check_factor: 6.0,
                down_factor: 1.5,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub namespace: String,
    pub name: String,
    pub selector_key: String,
    pub selector_value: String,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            name: "tidb-cluster".to_string(),
            selector_key: "app.kubernetes.io/component".to_string(),
            selector_value: "tikv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// `host:port` of the bandwidth coordinator.
    pub address: String,
    pub timeout: String,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8888".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    /// `host:port` of the placement driver.
    pub address: String,
    pub timeout: String,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2379".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeSection {
    /// `host:port` of the cluster API (typically a local API proxy).
    pub address: String,
    pub group: String,
    pub version: String,
    pub plural: String,
    /// JSON pointer to the replica count inside the cluster object.
    pub replicas_pointer: String,
    pub timeout: String,
}

impl Default for KubeSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8001".to_string(),
            group: "pingcap.com".to_string(),
            version: "v1alpha1".to_string(),
            plural: "tidbclusters".to_string(),
            replicas_pointer: "/spec/tikv/replicas".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub path: String,
    /// Key prefix; defaults to `/storage/show/{variant}`.
    pub prefix: Option<String>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: "/var/lib/tidescale/ledger.redb".to_string(),
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSection {
    pub enabled: bool,
    pub listen: String,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:9464".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitySection {
    /// `host:port` of the Prometheus query API.
    pub prometheus: String,
    pub query: String,
    pub interval: String,
    pub timeout: String,
    pub capacity_per_store_gb: f64,
    pub warn_ratio: f64,
    pub growth_ratio: f64,
}

impl Default for CapacitySection {
    fn default() -> Self {
        Self {
            prometheus: "127.0.0.1:9090".to_string(),
            query: "sum(tikv_engine_size_bytes) by (instance)".to_string(),
            interval: "5s".to_string(),
            timeout: "5s".to_string(),
            capacity_per_store_gb: 10.0,
            warn_ratio: 0.8,
            growth_ratio: 0.25,
        }
    }
}

// ── Frozen engine configuration ────────────────────────────────────

/// Immutable thresholds handed to the engine at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub epoch: Duration,
    pub settle_delay: Duration,
    pub initial_replicas: u32,
    pub initial_ceiling: f64,
    pub step: u32,
    pub low_bound: f64,
    pub check_balance_window: u32,
    pub sanity_ceiling: f64,
    pub target: ClusterTarget,
    pub ledger_keys: LedgerKeys,
    pub policy: PolicyConfig,
}

impl EngineConfig {
    pub fn variant(&self) -> Variant {
        match self.policy {
            PolicyConfig::Basic(_) => Variant::Basic,
            PolicyConfig::Adaptive(_) => Variant::Adaptive,
        }
    }
}

/// Variant-specific thresholds.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyConfig {
    Basic(BasicPolicy),
    Adaptive(AdaptivePolicy),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicPolicy {
    pub up_bound: f64,
    pub check_scale_out_window: u32,
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptivePolicy {
    pub reserve_bw_limit: f64,
    pub scale_bw_limit: f64,
    pub narrow: BandFactors,
    pub wide: BandFactors,
    pub up_history_len: usize,
    pub down_history_len: usize,
}

impl TidescaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TidescaleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the engine sections and freeze them.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let engine = &self.engine;

        let epoch = duration_field("engine.epoch", &engine.epoch)?;
        if epoch.is_zero() {
            return Err(ConfigError::invalid("engine.epoch", "must be positive"));
        }
        let settle_delay = duration_field("engine.settle_delay", &engine.settle_delay)?;
        if engine.step == 0 {
            return Err(ConfigError::invalid("engine.step", "must be at least 1"));
        }
        positive("engine.sanity_ceiling", engine.sanity_ceiling)?;

        let target = ClusterTarget {
            namespace: self.cluster.namespace.clone(),
            cluster_name: self.cluster.name.clone(),
            selector_key: self.cluster.selector_key.clone(),
            selector_value: self.cluster.selector_value.clone(),
        };
        let ledger_keys = match &self.ledger.prefix {
            Some(prefix) => LedgerKeys::for_prefix(prefix),
            None => LedgerKeys::for_variant(engine.variant),
        };

        let (initial_ceiling, low_bound, check_balance_window, policy) = match engine.variant {
            Variant::Basic => {
                let basic = &engine.basic;
                positive("engine.basic.bandwidth_limit", basic.bandwidth_limit)?;
                non_negative("engine.basic.up_bound", basic.up_bound)?;
                non_negative("engine.basic.low_bound", basic.low_bound)?;
                nonzero("engine.basic.check_scale_out_window", basic.check_scale_out_window as usize)?;
                nonzero("engine.basic.history_len", basic.history_len)?;
                (
                    basic.bandwidth_limit,
                    basic.low_bound,
                    basic.check_balance_window,
                    PolicyConfig::Basic(BasicPolicy {
                        up_bound: basic.up_bound,
                        check_scale_out_window: basic.check_scale_out_window,
                        history_len: basic.history_len,
                    }),
                )
            }
            Variant::Adaptive => {
                let adaptive = &engine.adaptive;
                positive("engine.adaptive.reserve_bw", adaptive.reserve_bw)?;
                positive("engine.adaptive.reserve_bw_limit", adaptive.reserve_bw_limit)?;
                non_negative("engine.adaptive.low_bound", adaptive.low_bound)?;
                positive("engine.adaptive.scale_bw_limit", adaptive.scale_bw_limit)?;
                if adaptive.scale_bw_limit < adaptive.reserve_bw {
                    return Err(ConfigError::invalid(
                        "engine.adaptive.scale_bw_limit",
                        "must not be below reserve_bw",
                    ));
                }
                nonzero("engine.adaptive.up_history_len", adaptive.up_history_len)?;
                nonzero("engine.adaptive.down_history_len", adaptive.down_history_len)?;
                band("engine.adaptive.narrow", &adaptive.narrow)?;
                band("engine.adaptive.wide", &adaptive.wide)?;
                if adaptive.wide.up_check_factor < adaptive.narrow.up_check_factor
                    || adaptive.wide.down_check_factor < adaptive.narrow.down_check_factor
                {
                    return Err(ConfigError::invalid(
                        "engine.adaptive.wide",
                        "check factors must not be narrower than the narrow band",
                    ));
                }
                (
                    adaptive.reserve_bw,
                    adaptive.low_bound,
                    adaptive.check_balance_window,
                    PolicyConfig::Adaptive(AdaptivePolicy {
                        reserve_bw_limit: adaptive.reserve_bw_limit,
                        scale_bw_limit: adaptive.scale_bw_limit,
                        narrow: adaptive.narrow,
                        wide: adaptive.wide,
                        up_history_len: adaptive.up_history_len,
                        down_history_len: adaptive.down_history_len,
                    }),
                )
            }
        };

        Ok(EngineConfig {
            epoch,
            settle_delay,
            initial_replicas: engine.initial_replicas,
            initial_ceiling,
            step: engine.step,
            low_bound,
            check_balance_window,
            sanity_ceiling: engine.sanity_ceiling,
            target,
            ledger_keys,
            policy,
        })
    }
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Parse a duration field, naming it in the error.
pub fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must not be negative, got {value}")))
    }
}

fn nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::invalid(field, "must be at least 1"))
    } else {
        Ok(())
    }
}

fn band(field: &'static str, factors: &BandFactors) -> Result<(), ConfigError> {
    for value in [
        factors.up_factor,
        factors.up_check_factor,
        factors.down_check_factor,
        factors.down_factor,
    ] {
        positive(field, value)?;
    }
    if factors.up_check_factor >= factors.down_check_factor {
        return Err(ConfigError::invalid(
            field,
            "up_check_factor must be below down_check_factor",
        ));
    }
    Ok(())
}
