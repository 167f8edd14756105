//! Device bring-up
//!
//! Privilege check and one-time kernel module insertion. Everything here is
//! a precondition for opening the device; there is no degraded mode without
//! the accelerator, so callers treat any error as fatal.

use crate::config::DriverConfig;
use crate::error::{IntuitusError, Result};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const NODE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Require an effective uid of 0
///
/// # Errors
///
/// Returns `DeviceCreation` when not running as root.
pub fn check_privileges() -> Result<()> {
    let euid = rustix::process::geteuid();
    if euid.is_root() {
        debug!("Running with root privileges");
        Ok(())
    } else {
        Err(IntuitusError::device_creation(format!(
            "driver requires root privileges (euid {})",
            euid.as_raw()
        )))
    }
}

/// Insert the kernel module unless the device node already exists
///
/// # Errors
///
/// Returns `DeviceCreation` if the loader cannot be spawned or exits with a
/// failure, and `DeviceNotFound` if the node does not appear afterwards.
pub fn ensure_module_loaded(config: &DriverConfig) -> Result<()> {
    if config.device_path.exists() {
        debug!("{} present, module already loaded", config.device_path.display());
        return Ok(());
    }

    info!(
        "{} missing, loading {} with {}",
        config.device_path.display(),
        config.module_path.display(),
        config.module_loader
    );

    let status = Command::new(&config.module_loader)
        .arg(&config.module_path)
        .status()
        .map_err(|e| {
            IntuitusError::device_creation(format!("cannot run {}: {e}", config.module_loader))
        })?;

    if !status.success() {
        return Err(IntuitusError::device_creation(format!(
            "error loading {}: {} exited with {status}. Check the module path and that the \
             AXI VDMA core is present in the device tree",
            config.module_path.display(),
            config.module_loader
        )));
    }

    wait_for_node(&config.device_path, config.node_wait)?;
    info!("Kernel module loaded");
    Ok(())
}

/// Poll until `path` exists or `timeout` elapses
fn wait_for_node(path: &Path, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if path.exists() {
            debug!("Device node {} created", path.display());
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(IntuitusError::DeviceNotFound {
                path: path.to_path_buf(),
            });
        }
        std::thread::sleep(NODE_POLL_INTERVAL);
    }
}
