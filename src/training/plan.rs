//! 学習計画（外部フレームワーク向けのJSON）

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::ImageFolderDataset;
use crate::training::backend::{ExportSpec, ModelSpec, StageSpec};

/// 分割ごとのデータセット概要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub samples: usize,
    /// クラス名 → 枚数
    pub class_counts: BTreeMap<String, usize>,
    pub batches_per_epoch: usize,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &ImageFolderDataset, batch_size: usize) -> Self {
        Self {
            path: dataset.root().to_path_buf(),
            samples: dataset.len(),
            class_counts: dataset
                .class_names()
                .iter()
                .cloned()
                .zip(dataset.class_counts())
                .collect(),
            batches_per_epoch: dataset.num_batches(batch_size),
        }
    }
}

/// 学習パイプライン全体の記述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    /// クラスラベル（クラスID順）
    pub classes: Vec<String>,
    /// "train" / "val" / "test" → 概要
    pub datasets: BTreeMap<String, DatasetSummary>,
    pub model: ModelSpec,
    pub stages: Vec<StageSpec>,
    pub export: ExportSpec,
    pub model_output: PathBuf,
    pub created_at: String,
}

impl TrainingPlan {
    pub fn total_epochs(&self) -> usize {
        self.stages.iter().map(|s| s.epochs).sum()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create parent directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize training plan")?;
        fs::write(path, json).context(format!("Failed to write training plan: {:?}", path))?;
        Ok(())
    }

    /// 計画の概要を表示
    pub fn display(&self) {
        println!("=== 学習計画 ===");
        println!("クラス数: {}", self.classes.len());
        for (split, summary) in &self.datasets {
            println!(
                "  {}: {} 枚 ({} バッチ/エポック) - {}",
                split,
                summary.samples,
                summary.batches_per_epoch,
                summary.path.display()
            );
        }
        println!(
            "モデル: {} ({}x{}, 重み: {})",
            self.model.backbone,
            self.model.input_size,
            self.model.input_size,
            self.model.pretrained_weights
        );
        for stage in &self.stages {
            println!(
                "  ステージ {}: {} エポック, 学習率 {}",
                stage.kind, stage.epochs, stage.learning_rate
            );
        }
        println!(
            "エクスポート: {} ({})",
            self.model_output.display(),
            if self.export.quantize { "INT8" } else { "float32" }
        );
        println!("================");
    }
}
