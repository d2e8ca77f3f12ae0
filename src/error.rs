//! ドメインエラー定義

use std::path::PathBuf;
use thiserror::Error;

/// データセット分割・読み込みのエラー
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("source directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("no class folders found in {0}")]
    NoClassFolders(PathBuf),

    #[error("split ratios must each be within [0, 1] and sum to 1.0 (got {train}/{val}/{test})")]
    InvalidRatios { train: f64, val: f64, test: f64 },

    #[error("dataset directory not found: {0}")]
    DirectoryMissing(PathBuf),

    #[error("invalid class directory name: {0}")]
    InvalidClassName(PathBuf),

    #[error("image file name is not valid UTF-8: {0}")]
    InvalidFileName(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 学習パイプラインのエラー
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training directory not found: {0}")]
    TrainDirMissing(PathBuf),

    #[error("validation directory not found: {0}")]
    ValDirMissing(PathBuf),

    #[error("test directory not found: {0}")]
    TestDirMissing(PathBuf),

    #[error("no training samples found in {0}")]
    EmptyDataset(PathBuf),

    #[error("backend returned an empty model artifact")]
    EmptyArtifact,

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
