//! Driver configuration
//!
//! Defaults match the stock Intuitus deployment; every field can be
//! overridden from the environment so the same binary works across boards.

use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Device node created by the kernel module.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/intuitus_vdma";

/// Kernel module file name.
pub const MODULE_FILE_NAME: &str = "intuitus.ko";

/// Command used to insert the kernel module.
pub const DEFAULT_MODULE_LOADER: &str = "insmod";

/// Environment overrides.
pub mod env {
    /// Device node path.
    pub const DEVICE: &str = "INTUITUS_DEVICE";
    /// Kernel module path.
    pub const MODULE_PATH: &str = "INTUITUS_MODULE_PATH";
    /// Module loader command.
    pub const MODULE_LOADER: &str = "INTUITUS_MODULE_LOADER";
    /// Milliseconds to wait for the node after loading the module.
    pub const NODE_WAIT_MS: &str = "INTUITUS_NODE_WAIT_MS";
    /// Send `LAYER_OPTIMIZE_DMA` hints (`1` / `true`).
    pub const OPTIMIZE_DMA: &str = "INTUITUS_OPTIMIZE_DMA";
}

/// Bring-up and graph-build configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Device node of the accelerator
    pub device_path: PathBuf,

    /// Kernel module inserted when the node is missing
    pub module_path: PathBuf,

    /// Program that inserts `module_path`
    pub module_loader: String,

    /// How long to wait for udev to create the node after loading
    pub node_wait: Duration,

    /// Forward scatter-list sizes to the driver after each tiled layer
    pub optimize_dma: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/root"), PathBuf::from);
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            module_path: home.join(MODULE_FILE_NAME),
            module_loader: DEFAULT_MODULE_LOADER.to_string(),
            node_wait: Duration::from_secs(5),
            optimize_dma: false,
        }
    }
}

impl DriverConfig {
    /// Defaults overlaid with `INTUITUS_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(env::DEVICE) {
            config.device_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(env::MODULE_PATH) {
            config.module_path = PathBuf::from(path);
        }
        if let Some(loader) = lookup(env::MODULE_LOADER) {
            config.module_loader = loader;
        }
        if let Some(ms) = lookup(env::NODE_WAIT_MS).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.node_wait = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup(env::OPTIMIZE_DMA) {
            config.optimize_dma = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }

        debug!("Driver config: {config:?}");
        config
    }

    /// Use a different device node
    #[must_use]
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = path.into();
        self
    }

    /// Use a different kernel module
    #[must_use]
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = path.into();
        self
    }

    /// Enable or disable DMA optimisation hints
    #[must_use]
    pub const fn with_optimize_dma(mut self, enabled: bool) -> Self {
        self.optimize_dma = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_stock_node() {
        let config = DriverConfig::from_lookup(|_| None);
        assert_eq!(config.device_path, PathBuf::from("/dev/intuitus_vdma"));
        assert!(config.module_path.ends_with("intuitus.ko"));
        assert_eq!(config.module_loader, "insmod");
        assert!(!config.optimize_dma);
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::DEVICE, "/dev/intuitus1"),
            (env::MODULE_PATH, "/lib/modules/extra/intuitus.ko"),
            (env::NODE_WAIT_MS, "250"),
            (env::OPTIMIZE_DMA, "true"),
        ]
        .into_iter()
        .collect();

        let config = DriverConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.device_path, PathBuf::from("/dev/intuitus1"));
        assert_eq!(config.module_path, PathBuf::from("/lib/modules/extra/intuitus.ko"));
        assert_eq!(config.node_wait, Duration::from_millis(250));
        assert!(config.optimize_dma);
    }

    #[test]
    fn malformed_wait_keeps_default() {
        let config = DriverConfig::from_lookup(|k| (k == env::NODE_WAIT_MS).then(|| "soon".into()));
        assert_eq!(config.node_wait, Duration::from_secs(5));
    }
}
