//! Linux: sysinfo's disk kind, falling back to the block device's `queue/rotational` flag.

use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{Disk, DiskKind};

use super::DriveType;
use super::network::is_network_fs;

pub fn classify(path: &Path, disk: &Disk) -> DriveType {
    if is_network_fs(&disk.file_system().to_string_lossy()) {
        log::debug!("{}: network file system", path.display());
        return DriveType::Network;
    }
    match disk.kind() {
        DiskKind::SSD => DriveType::SSD,
        DiskKind::HDD => DriveType::HDD,
        DiskKind::Unknown(_) => disk
            .name()
            .to_str()
            .and_then(|dev| dev.strip_prefix("/dev/"))
            .and_then(rotational)
            .unwrap_or(DriveType::Unknown),
    }
}

/// Sysfs directory of the whole disk behind `dev` (`sda1` -> `.../block/sda`).
fn whole_disk_dir(dev: &str) -> Option<PathBuf> {
    let dir = fs::canonicalize(Path::new("/sys/class/block").join(dev)).ok()?;
    if dir.join("partition").exists() {
        dir.parent().map(Path::to_path_buf)
    } else {
        Some(dir)
    }
}

fn rotational(dev: &str) -> Option<DriveType> {
    let flag = fs::read_to_string(whole_disk_dir(dev)?.join("queue/rotational")).ok()?;
    match flag.trim() {
        "1" => Some(DriveType::HDD),
        "0" => Some(DriveType::SSD),
        _ => None,
    }
}
