//! モデル成果物のメタデータ
//!
//! tar.gz形式でモデルと一緒に保存されます。
//! モデル本体はフレームワークが出力した不透明なバイナリで、このクレートは中身を解釈しません。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::training::EvalMetrics;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.tflite: 量子化済みモデル（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// クラスラベル（モデル出力のインデックス順）
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常224）
    pub input_size: u32,

    /// INT8量子化済みかどうか
    pub quantized: bool,

    /// モデルバイナリのサイズ（バイト）
    pub size_bytes: u64,

    /// テストデータでの評価結果
    #[serde(default)]
    pub metrics: Option<EvalMetrics>,

    /// 作成日時（ISO8601形式）
    pub created_at: String,
}

impl ArtifactMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        class_labels: Vec<String>,
        input_size: u32,
        quantized: bool,
        size_bytes: u64,
    ) -> Self {
        Self {
            class_labels,
            input_size,
            quantized,
            size_bytes,
            metrics: None,
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn with_metrics(mut self, metrics: EvalMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// モデルサイズ（MB）
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
