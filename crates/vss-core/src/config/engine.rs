use serde::{Deserialize, Serialize};

/// Engine-wide settings handed to the `vss0` module when it is registered.
///
/// Column declarations override the defaults per column; the remaining knobs
/// apply to every table created through the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VssConfig {
    /// Name the virtual table module is registered under
    /// Default: "vss0"
    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Build spec used when a column declares no `factory=`
    /// Default: "Flat,IDMap2"
    #[serde(default = "default_factory")]
    pub default_factory: String,

    /// Metric used when a column declares no `metric_type=`
    /// Default: "L2"
    #[serde(default = "default_metric")]
    pub default_metric: String,

    /// Inverted lists probed per IVF query
    /// Default: 1
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Lloyd iterations run when training an IVF quantizer
    /// Default: 25
    #[serde(default = "default_kmeans_iterations")]
    pub kmeans_iterations: usize,

    /// Reload clean indexes when another connection has committed since the
    /// last load (tracked through `PRAGMA data_version`)
    /// Default: true
    #[serde(default = "default_track_data_version")]
    pub track_data_version: bool,
}

fn default_module_name() -> String {
    "vss0".to_string()
}

fn default_factory() -> String {
    "Flat,IDMap2".to_string()
}

fn default_metric() -> String {
    "L2".to_string()
}

fn default_nprobe() -> usize {
    1
}

fn default_kmeans_iterations() -> usize {
    25
}

fn default_track_data_version() -> bool {
    true
}

impl Default for VssConfig {
    fn default() -> Self {
        Self {
            module_name: default_module_name(),
            default_factory: default_factory(),
            default_metric: default_metric(),
            nprobe: default_nprobe(),
            kmeans_iterations: default_kmeans_iterations(),
            track_data_version: default_track_data_version(),
        }
    }
}

impl VssConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn with_default_factory(mut self, factory: impl Into<String>) -> Self {
        self.default_factory = factory.into();
        self
    }

    pub fn with_default_metric(mut self, metric: impl Into<String>) -> Self {
        self.default_metric = metric.into();
        self
    }

    /// Number of inverted lists scanned per IVF query (clamped to at least 1)
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe.max(1);
        self
    }

    pub fn with_kmeans_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_iterations = iterations.max(1);
        self
    }

    pub fn with_track_data_version(mut self, enabled: bool) -> Self {
        self.track_data_version = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: VssConfig = serde_json::from_str(r#"{"nprobe": 4}"#).unwrap();
        assert_eq!(cfg.nprobe, 4);
        assert_eq!(cfg.module_name, "vss0");
        assert_eq!(cfg.default_factory, "Flat,IDMap2");
        assert_eq!(cfg.default_metric, "L2");
        assert_eq!(cfg.kmeans_iterations, 25);
        assert!(cfg.track_data_version);
    }

    #[test]
    fn test_builder_clamps_probe_count() {
        let cfg = VssConfig::new().with_nprobe(0).with_kmeans_iterations(0);
        assert_eq!(cfg.nprobe, 1);
        assert_eq!(cfg.kmeans_iterations, 1);
    }
}
