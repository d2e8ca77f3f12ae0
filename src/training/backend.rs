//! 学習フレームワークとの境界
//!
//! モデル構築・学習ループ・量子化はすべて外部フレームワークの責務です。
//! このモジュールはフレームワークへ渡す設定と、戻ってくる結果の型だけを定義します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::dataset::ImageFolderDataset;
use crate::model::config::{AugmentationSettings, EarlyStoppingSettings, ReduceLrSettings};

/// モデル構成（事前学習済みバックボーン + 分類ヘッド）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub backbone: String,
    pub pretrained_weights: String,
    pub input_size: u32,
    pub num_classes: usize,
    pub dropout: f64,
    pub head_units: usize,
    pub head_dropout: f64,
    /// 初期状態ではバックボーンを凍結する
    pub backbone_trainable: bool,
}

/// 学習ステージの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// バックボーン凍結、ヘッドのみ学習
    Frozen,
    /// バックボーンを解凍して低い学習率で再学習
    FineTune,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Frozen => write!(f, "frozen"),
            StageKind::FineTune => write!(f, "fine_tune"),
        }
    }
}

/// 学習中のコールバック設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSpec {
    pub early_stopping: EarlyStoppingSettings,
    pub reduce_lr: ReduceLrSettings,
    /// val_accuracy が最良のときだけ保存する
    pub checkpoint_path: PathBuf,
}

/// 1ステージ分の学習設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kind: StageKind,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub backbone_trainable: bool,
    pub optimizer: String,
    pub loss: String,
    pub metrics: Vec<String>,
    /// 学習データのデータ拡張
    pub train_augmentation: AugmentationSettings,
    /// 検証データの前処理（リスケールのみ）
    pub eval_augmentation: AugmentationSettings,
    pub callbacks: CallbackSpec,
}

/// 1エポック分の記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

/// 学習履歴
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// val_accuracy が最良のエポック
    pub fn best(&self) -> Option<&EpochRecord> {
        self.epochs
            .iter()
            .max_by(|a, b| a.val_accuracy.total_cmp(&b.val_accuracy))
    }
}

/// テストデータでの評価結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub top3_accuracy: f64,
}

/// エクスポート設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpec {
    /// INT8量子化（falseならfloat32のまま）
    pub quantize: bool,
    /// 量子化のキャリブレーションに使うバッチ数（検証データから取得）
    pub representative_batches: usize,
    pub batch_size: usize,
    /// 入出力テンソルの型
    pub io_type: String,
}

/// 外部の学習フレームワーク
///
/// 呼び出し順は `build_model` → `fit`（凍結）→ `fit`（ファインチューニング）→ `evaluate` → `export`。
/// 返したエラーはそのまま呼び出し元へ伝播する。
pub trait TrainingBackend {
    fn build_model(&mut self, spec: &ModelSpec) -> anyhow::Result<()>;

    fn fit(
        &mut self,
        stage: &StageSpec,
        train: &ImageFolderDataset,
        val: &ImageFolderDataset,
    ) -> anyhow::Result<TrainingHistory>;

    fn evaluate(
        &mut self,
        test: &ImageFolderDataset,
        batch_size: usize,
    ) -> anyhow::Result<EvalMetrics>;

    /// 推論用モデルを出力する。戻り値はフレームワークが生成したバイナリそのもの
    fn export(
        &mut self,
        spec: &ExportSpec,
        representative: &ImageFolderDataset,
    ) -> anyhow::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_accuracy: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            loss: 1.0,
            accuracy: 0.5,
            val_loss: 1.0,
            val_accuracy,
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn test_best_epoch() {
        let history = TrainingHistory {
            epochs: vec![record(1, 0.5), record(2, 0.8), record(3, 0.7)],
        };
        assert_eq!(history.best().map(|r| r.epoch), Some(2));
        assert!(TrainingHistory::default().best().is_none());
    }

    #[test]
    fn test_stage_kind_serialization() {
        assert_eq!(serde_json::to_string(&StageKind::FineTune).unwrap(), "\"fine_tune\"");
        assert_eq!(StageKind::Frozen.to_string(), "frozen");
    }
}
