//! Package file-tree checksum.
//!
//! SHA-256 over the concatenated bytes of every file. Within a directory,
//! files are hashed in name order before its subdirectories are visited
//! (also in name order).

use super::walker::{walk_directory_with_callback, WalkOptions};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Compute the checksum of the tree under `root`.
///
/// Unreadable files are skipped with a warning.
pub fn tree_checksum(root: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    let options = WalkOptions {
        sorted: true,
        ..WalkOptions::default()
    };

    walk_directory_with_callback(root, &options, |file| {
        if let Err(e) = hash_file(&file.path, &mut hasher, &mut buffer) {
            warn!("Could not read {} for checksum: {}", file.path.display(), e);
        }
        Ok(())
    })?;

    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_file(path: &Path, hasher: &mut Sha256, buffer: &mut [u8]) -> std::io::Result<()> {
    let mut file = File::open(path)?;
    loop {
        let bytes_read = file.read(buffer)?;
        if bytes_read == 0 {
            return Ok(());
        }
        hasher.update(&buffer[..bytes_read]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn test_empty_tree() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(tree_checksum(temp_dir.path()).unwrap(), sha256_hex(b""));
    }

    #[test]
    fn test_order_is_files_then_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("a")).unwrap();
        fs::write(temp_dir.path().join("a/inner"), b"3").unwrap();
        fs::write(temp_dir.path().join("z"), b"2").unwrap();
        fs::write(temp_dir.path().join("b"), b"1").unwrap();

        let checksum = tree_checksum(temp_dir.path()).unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, sha256_hex(b"123"));
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("app.py"), b"print(1)").unwrap();
        let before = tree_checksum(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("app.py"), b"print(2)").unwrap();
        assert_ne!(before, tree_checksum(temp_dir.path()).unwrap());
    }
}
