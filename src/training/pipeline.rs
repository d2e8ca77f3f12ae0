//! 学習パイプライン
//!
//! モデル構築 → データ読み込み → 学習（凍結）→ ファインチューニング → 評価 → 量子化エクスポート
//! の順に外部フレームワークを呼び出します。

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::ImageFolderDataset;
use crate::error::TrainingError;
use crate::model::config::AppConfig;
use crate::model::model_metadata::ArtifactMetadata;
use crate::model::model_storage::{bundle_path_for_model, save_bundle, write_model_file};
use crate::training::backend::{
    CallbackSpec, EvalMetrics, ExportSpec, ModelSpec, StageKind, StageSpec, TrainingBackend,
    TrainingHistory,
};
use crate::training::plan::{DatasetSummary, TrainingPlan};
use crate::types::Split;

const BACKBONE: &str = "mobilenet_v3_small";
const PRETRAINED_WEIGHTS: &str = "imagenet";

/// 学習に使う3つのデータセット（クラスIDは train と同じ並び）
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: ImageFolderDataset,
    pub val: ImageFolderDataset,
    pub test: ImageFolderDataset,
}

impl PreparedData {
    pub fn class_names(&self) -> &[String] {
        self.train.class_names()
    }
}

/// 学習の結果
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub histories: Vec<(StageKind, TrainingHistory)>,
    pub metrics: EvalMetrics,
    pub model_path: PathBuf,
    pub bundle_path: PathBuf,
    pub metadata: ArtifactMetadata,
}

/// 外部で学習したモデルを取り込んだ結果
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub model_path: PathBuf,
    pub bundle_path: PathBuf,
    pub metadata: ArtifactMetadata,
}

pub struct TrainingPipeline {
    config: AppConfig,
}

impl TrainingPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// データディレクトリを確認して読み込む
    ///
    /// train ディレクトリが無い場合は何もせずに `TrainDirMissing` を返す。
    pub fn preflight(&self) -> Result<PreparedData, TrainingError> {
        let train_dir = self.config.split_dir(Split::Train);
        let val_dir = self.config.split_dir(Split::Val);
        let test_dir = self.config.split_dir(Split::Test);

        if !train_dir.is_dir() {
            return Err(TrainingError::TrainDirMissing(train_dir));
        }
        if !val_dir.is_dir() {
            return Err(TrainingError::ValDirMissing(val_dir));
        }
        if !test_dir.is_dir() {
            return Err(TrainingError::TestDirMissing(test_dir));
        }

        let train = ImageFolderDataset::from_directory(&train_dir)?;
        if train.is_empty() {
            return Err(TrainingError::EmptyDataset(train_dir));
        }

        let expected = self.config.classes.len();
        if train.num_classes() != expected {
            warn!(
                "警告: 検出したクラス数 ({}) が設定のクラス数 ({}) と一致しません。検出したクラスを使用します",
                train.num_classes(),
                expected
            );
        }
        for name in train.empty_classes() {
            warn!("警告: クラス '{}' の学習画像がありません", name);
        }

        let val = ImageFolderDataset::from_directory_with_order(&val_dir, train.class_names())?;
        let test = ImageFolderDataset::from_directory_with_order(&test_dir, train.class_names())?;

        Ok(PreparedData { train, val, test })
    }

    pub fn model_spec(&self, num_classes: usize) -> ModelSpec {
        let t = &self.config.training;
        ModelSpec {
            backbone: BACKBONE.to_string(),
            pretrained_weights: PRETRAINED_WEIGHTS.to_string(),
            input_size: t.image_size,
            num_classes,
            dropout: t.dropout,
            head_units: t.head_units,
            head_dropout: t.head_dropout,
            backbone_trainable: false,
        }
    }

    /// 凍結ステージとファインチューニングステージ
    pub fn stages(&self) -> Vec<StageSpec> {
        let t = &self.config.training;
        let callbacks = CallbackSpec {
            early_stopping: t.early_stopping.clone(),
            reduce_lr: t.reduce_lr.clone(),
            checkpoint_path: t.checkpoint_path.clone(),
        };
        let stage = |kind, epochs, learning_rate, backbone_trainable| StageSpec {
            kind,
            epochs,
            learning_rate,
            batch_size: t.batch_size,
            backbone_trainable,
            optimizer: "adam".to_string(),
            loss: "categorical_crossentropy".to_string(),
            metrics: vec!["accuracy".to_string(), "top_3_accuracy".to_string()],
            train_augmentation: self.config.augmentation.clone(),
            eval_augmentation: self.config.augmentation.rescale_only(),
            callbacks: callbacks.clone(),
        };

        vec![
            stage(StageKind::Frozen, t.epochs, t.learning_rate, false),
            stage(StageKind::FineTune, t.fine_tune_epochs, t.fine_tune_learning_rate, true),
        ]
    }

    pub fn export_spec(&self) -> ExportSpec {
        let t = &self.config.training;
        ExportSpec {
            quantize: t.quantize,
            representative_batches: t.representative_batches,
            batch_size: t.batch_size,
            io_type: if t.quantize { "uint8" } else { "float32" }.to_string(),
        }
    }

    /// 外部フレームワーク向けの学習計画を作成
    pub fn plan(&self, data: &PreparedData) -> TrainingPlan {
        let batch_size = self.config.training.batch_size;
        let datasets: BTreeMap<String, DatasetSummary> = [
            (Split::Train, &data.train),
            (Split::Val, &data.val),
            (Split::Test, &data.test),
        ]
        .into_iter()
        .map(|(split, ds)| {
            let summary = DatasetSummary::from_dataset(ds, batch_size);
            (split.dir_name().to_string(), summary)
        })
        .collect();

        TrainingPlan {
            classes: data.class_names().to_vec(),
            datasets,
            model: self.model_spec(data.train.num_classes()),
            stages: self.stages(),
            export: self.export_spec(),
            model_output: self.config.export.model_output.clone(),
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// パイプライン全体を実行する。バックエンドのエラーはそのまま返す
    pub fn run<B: TrainingBackend + ?Sized>(&self, backend: &mut B) -> Result<TrainingOutcome> {
        let data = self.preflight()?;
        let class_names = data.class_names().to_vec();

        info!("モデルを作成中...");
        backend.build_model(&self.model_spec(class_names.len()))?;

        let mut histories = Vec::new();
        for stage in self.stages() {
            info!(
                "{} ステージを開始: {} エポック, 学習率 {}",
                stage.kind, stage.epochs, stage.learning_rate
            );
            let history = backend.fit(&stage, &data.train, &data.val)?;
            if let Some(best) = history.best() {
                info!(
                    "  最良エポック {}: val_accuracy {:.4}",
                    best.epoch, best.val_accuracy
                );
            }
            histories.push((stage.kind, history));
        }

        info!("テストデータで評価中...");
        let metrics = backend.evaluate(&data.test, self.config.training.batch_size)?;
        info!("Test Accuracy: {:.4}", metrics.accuracy);
        info!("Test Top-3 Accuracy: {:.4}", metrics.top3_accuracy);

        info!("推論用モデルに変換中...");
        let export = self.export_spec();
        let binary = backend.export(&export, &data.val)?;
        if binary.is_empty() {
            return Err(TrainingError::EmptyArtifact.into());
        }

        let metadata = ArtifactMetadata::new(
            class_names,
            self.config.training.image_size,
            export.quantize,
            binary.len() as u64,
        )
        .with_metrics(metrics.clone());
        let (model_path, bundle_path) = self.write_artifact(&binary, &metadata)?;

        Ok(TrainingOutcome {
            histories,
            metrics,
            model_path,
            bundle_path,
            metadata,
        })
    }

    /// 外部で学習・変換済みのモデルファイルを取り込む
    ///
    /// クラスラベルは train ディレクトリがあればそこから、無ければ設定から取得する。
    pub fn package(&self, model_file: &Path) -> Result<PackageOutcome> {
        let binary = std::fs::read(model_file)
            .context(format!("Failed to read model file: {:?}", model_file))?;
        if binary.is_empty() {
            return Err(TrainingError::EmptyArtifact.into());
        }

        let train_dir = self.config.split_dir(Split::Train);
        let class_names = if train_dir.is_dir() {
            ImageFolderDataset::from_directory(&train_dir)?.class_names().to_vec()
        } else {
            warn!(
                "{} が見つかりません。設定のクラス一覧を使用します",
                train_dir.display()
            );
            self.config.classes.clone()
        };

        let metadata = ArtifactMetadata::new(
            class_names,
            self.config.training.image_size,
            self.config.training.quantize,
            binary.len() as u64,
        );
        let (model_path, bundle_path) = self.write_artifact(&binary, &metadata)?;

        Ok(PackageOutcome {
            model_path,
            bundle_path,
            metadata,
        })
    }

    fn write_artifact(
        &self,
        binary: &[u8],
        metadata: &ArtifactMetadata,
    ) -> Result<(PathBuf, PathBuf)> {
        let model_path = self.config.export.model_output.clone();
        write_model_file(&model_path, binary)?;
        info!("モデルを保存しました: {}", model_path.display());
        info!("モデルサイズ: {:.2} MB", metadata.size_mb());

        let bundle = save_bundle(&bundle_path_for_model(&model_path), metadata, binary)?;
        info!("メタデータ付きバンドル: {}", bundle.display());
        info!(
            "このファイルをアプリへコピーしてください: {}",
            self.config.export.app_asset_path.display()
        );

        Ok((model_path, bundle))
    }
}
