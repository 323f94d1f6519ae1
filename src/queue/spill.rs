//! Task-private spill file: append at the tail, read at the head.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};
use crate::queue::RECORD_HEADER_LEN;

/// A single append-only file holding the oldest spilled records.
///
/// Records are framed as `[len u32][crc32 u32][payload]`, identical to the
/// in-memory page layout, so spilling is a raw byte copy. Reads and writes
/// track independent positions in the same handle.
#[derive(Debug)]
pub(crate) struct SpillFile {
    path: PathBuf,
    file: File,
    read_pos: u64,
    write_pos: u64,
}

impl SpillFile {
    /// Creates the spill file at the given task-private path.
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                BridgeError::SpillError(format!(
                    "failed to create spill file {}: {e}",
                    path.display()
                ))
            })?;
        Ok(SpillFile {
            path: path.to_path_buf(),
            file,
            read_pos: 0,
            write_pos: 0,
        })
    }

    /// Returns the spill file path.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Appends already-framed record bytes at the tail.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(self.write_pos))
            .map_err(|e| BridgeError::SpillError(format!("failed to seek spill tail: {e}")))?;
        self.file
            .write_all(bytes)
            .map_err(|e| BridgeError::SpillError(format!("failed to write spill file: {e}")))?;
        self.write_pos += bytes.len() as u64;
        Ok(())
    }

    /// Reads and consumes the oldest record's payload, verifying its
    /// checksum.
    pub(crate) fn read_record(&mut self) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(self.read_pos))
            .map_err(|e| BridgeError::SpillError(format!("failed to seek spill head: {e}")))?;

        let mut header = [0u8; RECORD_HEADER_LEN];
        self.file
            .read_exact(&mut header)
            .map_err(|e| BridgeError::SpillError(format!("failed to read spill header: {e}")))?;
        let len = u32::from_le_bytes(header[0..4].try_into().expect("4-byte window")) as usize;
        let expected_crc = u32::from_le_bytes(header[4..8].try_into().expect("4-byte window"));

        let mut payload = vec![0u8; len];
        self.file
            .read_exact(&mut payload)
            .map_err(|e| BridgeError::SpillError(format!("failed to read spill record: {e}")))?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(BridgeError::ChecksumError(format!(
                "spilled record at offset {} expected {expected_crc:#010x}, got {actual_crc:#010x}",
                self.read_pos
            )));
        }

        self.read_pos += (RECORD_HEADER_LEN + len) as u64;
        Ok(payload)
    }

    /// Closes the handle and deletes the file.
    pub(crate) fn delete(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.file);
        std::fs::remove_file(&path).map_err(|e| {
            BridgeError::SpillError(format!(
                "failed to delete spill file {}: {e}",
                path.display()
            ))
        })
    }
}
