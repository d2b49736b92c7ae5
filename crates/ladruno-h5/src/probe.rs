//! Superblock inspection.
//!
//! Superblock versions 2 and 3 carry a file-consistency flags byte at
//! offset 11. The library sets bit 0 (write access) or bit 2 (SWMR
//! write) while a writer has the file open and clears them on close.

use crate::types::RepairStatus;
use camino::Utf8Path;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
const WRITE_ACCESS: u8 = 0x01;
const SWMR_WRITE_ACCESS: u8 = 0x04;

/// Classifies a single file.
pub trait IntegrityProbe {
    fn probe(&self, path: &Utf8Path) -> RepairStatus;
}

/// Reads the HDF5 superblock directly instead of linking libhdf5.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperblockProbe;

impl IntegrityProbe for SuperblockProbe {
    fn probe(&self, path: &Utf8Path) -> RepairStatus {
        match read_superblock_head(path) {
            Ok(Some(head)) => classify(&head),
            Ok(None) => RepairStatus::Error("HDF5 signature not found".to_string()),
            Err(e) => RepairStatus::Error(e.to_string()),
        }
    }
}

fn classify(head: &[u8; 12]) -> RepairStatus {
    let version = head[8];
    if version >= 2 && head[11] & (WRITE_ACCESS | SWMR_WRITE_ACCESS) != 0 {
        RepairStatus::Flagged
    } else {
        RepairStatus::Ok
    }
}

/// First 12 superblock bytes, searched at 0, 512, 1024, 2048, ...
fn read_superblock_head(path: &Utf8Path) -> io::Result<Option<[u8; 12]>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut offset = 0u64;

    while offset + 12 <= len {
        let mut head = [0u8; 12];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut head)?;
        if head[..8] == SIGNATURE {
            return Ok(Some(head));
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Minimal superblock head followed by padding.
    pub(crate) fn superblock(version: u8, flags: u8) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&[version, 8, 8, flags]);
        bytes.resize(96, 0);
        bytes
    }

    fn probe_bytes(bytes: &[u8]) -> RepairStatus {
        let temp = TempDir::new().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("f.mpco");
        fs::write(&path, bytes).unwrap();
        SuperblockProbe.probe(&path)
    }

    #[test]
    fn test_clean_file() {
        assert_eq!(probe_bytes(&superblock(3, 0)), RepairStatus::Ok);
        assert_eq!(probe_bytes(&superblock(2, 0)), RepairStatus::Ok);
    }

    #[test]
    fn test_write_flags() {
        assert_eq!(probe_bytes(&superblock(3, 0x01)), RepairStatus::Flagged);
        assert_eq!(probe_bytes(&superblock(3, 0x05)), RepairStatus::Flagged);
        assert_eq!(probe_bytes(&superblock(2, 0x04)), RepairStatus::Flagged);
    }

    #[test]
    fn test_old_superblock_ignores_byte_11() {
        assert_eq!(probe_bytes(&superblock(0, 0x01)), RepairStatus::Ok);
    }

    #[test]
    fn test_signature_after_user_block() {
        let mut bytes = vec![0u8; 512];
        bytes.extend(superblock(3, 0x01));
        assert_eq!(probe_bytes(&bytes), RepairStatus::Flagged);
    }

    #[test]
    fn test_not_hdf5() {
        assert!(matches!(
            probe_bytes(b"this is a text file, not hdf5"),
            RepairStatus::Error(_)
        ));
        assert!(matches!(probe_bytes(b""), RepairStatus::Error(_)));
    }

    #[test]
    fn test_missing_file() {
        let status = SuperblockProbe.probe(Utf8Path::new("/no/such/file.mpco"));
        assert!(matches!(status, RepairStatus::Error(_)));
    }
}
