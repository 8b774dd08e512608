//! # Removable Storage
//!
//! The node records into files under a storage root (the SD card mount point
//! on hardware, a plain directory on a host). Availability is decided once at
//! mount time; the pipeline only reads the flag afterwards.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StartError;

pub struct Storage {
    root: PathBuf,
    available: AtomicBool,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            available: AtomicBool::new(false),
        }
    }

    /// Make the root usable. On failure the node keeps running but cannot record.
    pub fn mount(&self) -> bool {
        let mounted = match fs::create_dir_all(&self.root) {
            Ok(()) => {
                log::info!("Storage mounted at {}", self.root.display());
                true
            }
            Err(e) => {
                log::error!("Error mounting storage at {}: {}", self.root.display(), e);
                log::warn!("Continuing without storage. Data recording will not work.");
                false
            }
        };
        self.available.store(mounted, Ordering::Release);
        mounted
    }

    pub fn unmount(&self) {
        if self.available.swap(false, Ordering::AcqRel) {
            log::info!("Storage unmounted");
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Full path of a recording file. Only plain file names are accepted.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, StartError> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.root.join(name)),
            _ => Err(StartError::InvalidFilename(filename.to_string())),
        }
    }
}
