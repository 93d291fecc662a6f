//! Mounted volume enumeration.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Network and optical filesystems are never update media.
const EXCLUDED_FILESYSTEMS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smbfs", "smb3", "sshfs", "fuse.sshfs", "9p", "afs", "davfs",
    "iso9660", "udf", "cd9660", "cdfs",
];

/// Stable identifier of a mounted volume: its mount point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(PathBuf);

impl VolumeId {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self(mount_point.into())
    }

    pub fn mount_point(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Source of the currently mounted volume set.
pub trait VolumeScanner: Send {
    fn list_volumes(&mut self) -> anyhow::Result<BTreeSet<VolumeId>>;
}

/// Returns true for removable or fixed local filesystems.
pub fn is_local_filesystem(file_system: &str) -> bool {
    let fs = file_system.trim().to_ascii_lowercase();
    !EXCLUDED_FILESYSTEMS.contains(&fs.as_str())
}

/// Volumes reported by the operating system.
#[derive(Debug, Default)]
pub struct SystemVolumes;

impl SystemVolumes {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeScanner for SystemVolumes {
    fn list_volumes(&mut self) -> anyhow::Result<BTreeSet<VolumeId>> {
        let disks = Disks::new_with_refreshed_list();

        Ok(disks
            .list()
            .iter()
            .filter(|disk| disk.is_removable() || is_local_filesystem(&disk.file_system().to_string_lossy()))
            .map(|disk| VolumeId::new(disk.mount_point()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_filesystems() {
        assert!(is_local_filesystem("vfat"));
        assert!(is_local_filesystem("NTFS"));
        assert!(is_local_filesystem("ext4"));
        assert!(is_local_filesystem("exfat"));
        assert!(!is_local_filesystem("nfs4"));
        assert!(!is_local_filesystem("CIFS"));
        assert!(!is_local_filesystem("iso9660"));
    }

    #[test]
    fn test_volume_ids_order_by_mount_point() {
        let set: BTreeSet<VolumeId> = ["/media/b", "/media/a", "/media/a"]
            .into_iter()
            .map(VolumeId::new)
            .collect();
        let ordered: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(ordered, vec!["/media/a", "/media/b"]);
    }

    #[test]
    fn test_system_volumes_does_not_fail() {
        assert!(SystemVolumes::new().list_volumes().is_ok());
    }
}
