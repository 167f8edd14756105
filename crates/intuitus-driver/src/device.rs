//! Intuitus device node handle

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{IntuitusError, Result};

/// Open read/write handle on the accelerator device node
#[derive(Debug)]
pub struct DeviceHandle {
    file: File,
    path: PathBuf,
}

impl DeviceHandle {
    /// Open the device node
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if the node is absent and `DeviceCreation`
    /// if it cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IntuitusError::DeviceNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                IntuitusError::device_creation(format!(
                    "unable to open {}: {e}. Check that intuitus.ko is inserted",
                    path.display()
                ))
            })?;

        tracing::info!("Opened {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Device node path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for DeviceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DeviceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        tracing::info!("Closing {}", self.path.display());
    }
}
