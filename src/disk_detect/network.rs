/// Filesystem type names that mean network storage
#[inline]
pub(crate) fn is_network_fs(fs_type: &str) -> bool {
    const NETWORK_FS: [&str; 5] = ["nfs", "smb", "cifs", "afp", "webdav"];
    let fs = fs_type.to_lowercase();
    NETWORK_FS.iter().any(|n| fs.contains(n))
}

/// UNC mount points (`\\server\share`, `//server/share`)
#[cfg(target_os = "windows")]
#[inline]
pub(crate) fn is_network_mount(mount: &str) -> bool {
    mount.starts_with("\\\\") || mount.starts_with("//")
}
