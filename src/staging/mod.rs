//! Scratch area and staged files
//!
//! The scratch area is a plain directory wiped and recreated once per run.
//! Each entity is staged as `<Entity>.csv` inside it; staging the same
//! entity twice overwrites the earlier file.

pub mod csv;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{EtlError, EtlResult};
use crate::models::ResultSet;

/// Extension of staged files
pub const STAGED_EXTENSION: &str = "csv";

/// Compute SHA256 hash of content
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Handle to one staged file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedTable {
    /// Entity the file belongs to
    pub entity: String,
    /// Location of the file
    pub path: PathBuf,
    /// Data rows (header excluded)
    pub row_count: usize,
    /// File size in bytes
    pub bytes: u64,
    /// SHA-256 of the file content
    pub sha256: String,
}

/// The per-run scratch directory
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    /// Delete the directory if it exists, then create it empty
    ///
    /// Failure here is the one error that aborts a run.
    pub fn prepare(root: impl AsRef<Path>) -> EtlResult<Self> {
        let root = root.as_ref().to_path_buf();
        let fatal = |e: std::io::Error| EtlError::FatalSetup {
            path: root.clone(),
            message: e.to_string(),
        };

        if root.exists() {
            std::fs::remove_dir_all(&root).map_err(fatal)?;
        }
        std::fs::create_dir_all(&root).map_err(fatal)?;

        tracing::info!(path = %root.display(), "Scratch area prepared");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staged file location of an entity
    pub fn path_for(&self, entity: &str) -> PathBuf {
        self.root.join(format!("{}.{}", entity, STAGED_EXTENSION))
    }
}

/// Writes result sets as delimited text into a scratch area
pub struct CsvStager {
    scratch: ScratchArea,
}

impl CsvStager {
    pub fn new(scratch: ScratchArea) -> Self {
        Self { scratch }
    }

    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// Write `result` to the entity's staged file, replacing any earlier one
    pub async fn stage(&self, result: &ResultSet, entity: &str) -> EtlResult<StagedTable> {
        let path = self.scratch.path_for(entity);
        let content = csv::encode(result);

        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| EtlError::StagingIo {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let staged = StagedTable {
            entity: entity.to_string(),
            path,
            row_count: result.row_count(),
            bytes: content.len() as u64,
            sha256: compute_hash(content.as_bytes()),
        };
        tracing::info!(
            entity,
            rows = staged.row_count,
            bytes = staged.bytes,
            path = %staged.path.display(),
            "Staged result set"
        );
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_wipes_previous_contents() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("data_temp");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("Old.csv"), "stale").unwrap();

        let scratch = ScratchArea::prepare(&root).unwrap();
        assert!(scratch.root().is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        assert_eq!(scratch.path_for("DimTurno"), root.join("DimTurno.csv"));
    }

    #[test]
    fn test_prepare_fails_fatally_when_root_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let err = ScratchArea::prepare(blocker.join("scratch")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_stage_writes_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let stager = CsvStager::new(ScratchArea::prepare(temp.path().join("s")).unwrap());

        let first = ResultSet::from_rows(&["k"], vec![vec![Scalar::Int(1)], vec![Scalar::Int(2)]]);
        let staged = stager.stage(&first, "DimX").await.unwrap();
        assert_eq!(staged.row_count, 2);
        assert_eq!(std::fs::read_to_string(&staged.path).unwrap(), "k\n1\n2\n");

        let second = ResultSet::from_rows(&["k"], vec![vec![Scalar::from("a\nb")]]);
        let restaged = stager.stage(&second, "DimX").await.unwrap();
        assert_eq!(restaged.path, staged.path);
        assert_eq!(
            std::fs::read_to_string(&restaged.path).unwrap(),
            "k\n\"a\nb\"\n"
        );
        assert_ne!(restaged.sha256, staged.sha256);
        assert_eq!(restaged.bytes, 8);
    }
}
