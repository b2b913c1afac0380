//! Windows: UNC mounts and network file systems, otherwise sysinfo's (WMI) disk kind.

use std::path::Path;
use sysinfo::{Disk, DiskKind};

use super::DriveType;
use super::network::{is_network_fs, is_network_mount};

pub fn classify(path: &Path, disk: &Disk) -> DriveType {
    let remote = is_network_mount(&disk.mount_point().to_string_lossy())
        || is_network_fs(&disk.file_system().to_string_lossy());
    if remote {
        log::debug!("{}: network share", path.display());
        return DriveType::Network;
    }
    match disk.kind() {
        DiskKind::SSD => DriveType::SSD,
        DiskKind::HDD => DriveType::HDD,
        // Removable, virtual and some NVMe drives come back Unknown from WMI.
        DiskKind::Unknown(_) => DriveType::Unknown,
    }
}
