//! 植物認識モデルのデータ準備と学習パイプライン
//!
//! - `dataset`: クラスごとの画像フォルダを train/val/test に分割・読み込み
//! - `training`: 外部の学習フレームワークを呼び出すパイプライン
//! - `model`: 設定とモデル成果物の保存

pub mod cli;
pub mod error;
pub mod types;

pub mod dataset;
pub mod model;
pub mod training;

pub use error::{DatasetError, TrainingError};
pub use types::{Split, SplitRatios};
