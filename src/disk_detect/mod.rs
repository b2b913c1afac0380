//! Cross-platform volume and drive type detection for deriving partitions.
//!
//! When no partition string is configured, each root's volume (mount point) becomes a partition
//! whose stream limit depends on the drive type. See [`auto_partitions`].

use log::debug;
use std::path::{Path, PathBuf};
use sysinfo::{Disk, Disks};

use crate::pipeline::partition::{PartitionSet, PathPartition};
use crate::utils::config::StreamLimits;
use crate::utils::fd_limit::cap_streams_by_fd_limit;

// Platform-specific modules
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

pub mod network;

/// Drive type for concurrency tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    SSD,
    HDD,
    Network,
    Unknown,
}

impl DriveType {
    /// Concurrent streams allowed on one volume of this type.
    pub fn stream_limit(&self, limits: &StreamLimits) -> usize {
        match self {
            DriveType::SSD => limits.ssd_max,
            DriveType::HDD => limits.hdd_max,
            DriveType::Network => limits.network_max,
            DriveType::Unknown => limits.unknown_max,
        }
    }

    pub fn is_ssd(&self) -> bool {
        matches!(self, DriveType::SSD)
    }
}

/// The volume a path lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Mount point, or `None` when no mounted disk contains the path.
    pub mount_point: Option<PathBuf>,
    pub drive_type: DriveType,
}

/// Snapshot of the mounted disks, refreshed once and queried per root.
pub struct VolumeTable {
    disks: Disks,
}

impl VolumeTable {
    pub fn detect() -> Self {
        let disks = Disks::new_with_refreshed_list();
        debug!("Available disks:");
        for d in disks.iter() {
            debug!(
                "  mount={}, fs={}, kind={:?}",
                d.mount_point().display(),
                d.file_system().to_string_lossy(),
                d.kind()
            );
        }
        Self { disks }
    }

    /// Disk with the longest mount point that prefixes `path`.
    fn disk_for(&self, path: &Path) -> Option<&Disk> {
        let path_str = normalize(&path.to_string_lossy());
        self.disks
            .iter()
            .filter(|d| path_str.starts_with(&normalize(&d.mount_point().to_string_lossy())))
            .max_by_key(|d| d.mount_point().as_os_str().len())
    }

    pub fn volume_for(&self, path: &Path) -> Volume {
        match self.disk_for(path) {
            Some(disk) => Volume {
                mount_point: Some(disk.mount_point().to_path_buf()),
                drive_type: classify(path, disk),
            },
            None => {
                debug!("No disk found for path: {}", path.display());
                Volume {
                    mount_point: None,
                    drive_type: DriveType::Unknown,
                }
            }
        }
    }
}

/// Windows mount points may use either separator.
#[cfg(target_os = "windows")]
fn normalize(s: &str) -> String {
    s.replace('/', "\\")
}

#[cfg(not(target_os = "windows"))]
fn normalize(s: &str) -> String {
    s.to_string()
}

fn classify(path: &Path, disk: &Disk) -> DriveType {
    #[cfg(target_os = "macos")]
    {
        macos::classify(path, disk)
    }

    #[cfg(target_os = "linux")]
    {
        linux::classify(path, disk)
    }

    #[cfg(target_os = "windows")]
    {
        windows::classify(path, disk)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        debug!(
            "Unsupported platform for drive detection: {} on {}",
            path.display(),
            disk.mount_point().display()
        );
        DriveType::Unknown
    }
}

/// Detect drive type for the given path.
pub fn drive_type_for_path(path: &Path) -> DriveType {
    VolumeTable::detect().volume_for(path).drive_type
}

/// Derive a [`PartitionSet`] from the volumes holding `roots`: one partition per distinct mount
/// point, capped by drive type. Roots on no known volume get a partition of their own with the
/// unknown-drive limit. The global limit is the sum of partition limits, capped by available
/// threads and the open-file limit.
pub fn auto_partitions(roots: &[PathBuf], limits: &StreamLimits) -> PartitionSet {
    let table = VolumeTable::detect();
    let mut partitions: Vec<PathPartition> = Vec::new();
    for root in roots {
        let volume = table.volume_for(root);
        let prefix = match &volume.mount_point {
            Some(mount) => mount.to_string_lossy().into_owned(),
            None => root.to_string_lossy().into_owned(),
        };
        if partitions.iter().any(|p| p.prefix == prefix) {
            continue;
        }
        let limit = volume.drive_type.stream_limit(limits).max(1);
        debug!(
            "Volume {} ({:?}) for root {}: {} stream(s)",
            prefix,
            volume.drive_type,
            root.display(),
            limit
        );
        partitions.push(PathPartition::new(prefix, limit));
    }
    let wanted: usize = partitions.iter().map(|p| p.concurrency_limit).sum();
    let global = cap_streams_by_fd_limit(wanted.min(limits.all_threads.max(1)).max(1));
    PartitionSet {
        global_limit: global,
        partitions,
    }
}
