//! Queue progress persisted across restarts.

use std::path::Path;

use crate::error::SnapshotError;
use crate::queue::QueueSnapshot;

/// Load a snapshot; a missing file is an empty snapshot.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<QueueSnapshot, SnapshotError> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(QueueSnapshot::new())
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a snapshot through a temporary file and rename.
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &QueueSnapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(snapshot).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    let io_err = |source: std::io::Error| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
