#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Offset-addressed, crash-safe writes of chunk payload bytes to a
//! server-side file. See [`write_chunk`].

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Writes `data` to `path` at `offset`, creating parent directories and the
/// file itself if needed.
///
/// The file is opened read-write (created if absent, never truncated), the
/// write head is positioned at `offset`, `data` is written and flushed, and
/// a best-effort `sync_all` is attempted. A `sync_all` failure — which can
/// happen on filesystems that don't support it — is not treated as fatal,
/// matching the spec's contract for this component.
///
/// Writing at an `offset` past the current end of file is permitted and
/// produces a sparse region; bytes in the gap are unspecified until a later
/// write fills them.
pub fn write_chunk(path: &Path, data: &[u8], offset: u64) -> Result<(), ChunkWriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ChunkWriteError::Io)?;
        }
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(classify_open_error)?;

    file.seek(SeekFrom::Start(offset))
        .map_err(ChunkWriteError::Io)?;
    file.write_all(data).map_err(ChunkWriteError::Io)?;
    file.flush().map_err(ChunkWriteError::Io)?;
    let _ = file.sync_all();

    Ok(())
}

fn classify_open_error(err: std::io::Error) -> ChunkWriteError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        ChunkWriteError::PermissionDenied(err)
    } else {
        ChunkWriteError::Io(err)
    }
}

/// Errors returned by [`write_chunk`].
#[derive(Debug, thiserror::Error)]
pub enum ChunkWriteError {
    /// A generic I/O failure (surfaced as-is to the caller).
    #[error("chunk write I/O error: {0}")]
    Io(std::io::Error),
    /// The process lacked permission to open or write the target file.
    #[error("permission denied writing chunk: {0}")]
    PermissionDenied(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("u1").join("a.bin");
        write_chunk(&path, b"hello", 0).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_at_offset_zero_then_append_concatenates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_chunk(&path, b"DEAD", 0).unwrap();
        write_chunk(&path, b"BEEF", 4).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"DEADBEEF");
    }

    #[test]
    fn write_past_end_of_file_produces_sparse_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_chunk(&path, b"AB", 0).unwrap();
        write_chunk(&path, b"ZZ", 10).unwrap();
        let contents = fs::read(&path).unwrap();
        assert_eq!(contents.len(), 12);
        assert_eq!(&contents[0..2], b"AB");
        assert_eq!(&contents[10..12], b"ZZ");
    }

    #[test]
    fn overwriting_an_earlier_offset_does_not_truncate_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_chunk(&path, b"DEADBEEF", 0).unwrap();
        write_chunk(&path, b"XX", 0).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"XXADBEEF");
    }
}
