//! macOS: `statfs` on the path itself, since sysinfo reports some SMB/AFP mounts as local disks.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use sysinfo::{Disk, DiskKind};

use super::DriveType;
use super::network::is_network_fs;

fn mounted_fs_name(path: &Path) -> Option<String> {
    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat = std::mem::MaybeUninit::<libc::statfs>::zeroed();
    // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out-pointer for one statfs.
    let stat = unsafe {
        if libc::statfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return None;
        }
        stat.assume_init()
    };
    // SAFETY: the kernel NUL-terminates f_fstypename.
    let name = unsafe { CStr::from_ptr(stat.f_fstypename.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

pub fn classify(path: &Path, disk: &Disk) -> DriveType {
    let network = mounted_fs_name(path)
        .into_iter()
        .chain(std::iter::once(disk.file_system().to_string_lossy().into_owned()))
        .any(|fs| is_network_fs(&fs));
    if network {
        log::debug!("{}: network file system", path.display());
        return DriveType::Network;
    }
    match disk.kind() {
        DiskKind::HDD => DriveType::HDD,
        // Internal Apple storage is flash; sysinfo leaves it Unknown on some models.
        DiskKind::SSD | DiskKind::Unknown(_) => DriveType::SSD,
    }
}
