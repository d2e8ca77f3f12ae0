//! アプリケーション設定管理モジュール
//!
//! データ分割・学習・エクスポートの設定をJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::SplitRatios;

/// 認識対象の植物クラス（現在17種）
pub const PLANT_CLASSES: [&str; 17] = [
    "basil",
    "mint",
    "oregano",
    "lemongrass",
    "ginger",
    "tomato",
    "kangkong",
    "chili",
    "eggplant",
    "okra",
    "pechay",
    "lettuce",
    "papaya",
    "banana",
    "calamansi",
    "aloe_vera",
    "sansevieria",
];

/// データ分割設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSettings {
    /// 元画像のディレクトリ（クラスごとのサブフォルダ）
    pub source_dir: PathBuf,
    /// train/val/test を作成するディレクトリ
    pub output_dir: PathBuf,
    /// 分割比率
    pub ratios: SplitRatios,
    /// ランダムシード
    pub seed: u64,
    /// 対象とする画像拡張子（小文字）
    pub extensions: Vec<String>,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data"),
            ratios: SplitRatios::default(),
            seed: 42,
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

/// EarlyStopping の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingSettings {
    pub monitor: String,
    pub patience: usize,
    pub restore_best_weights: bool,
}

impl Default for EarlyStoppingSettings {
    fn default() -> Self {
        Self {
            monitor: "val_accuracy".to_string(),
            patience: 10,
            restore_best_weights: true,
        }
    }
}

/// ReduceLROnPlateau の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceLrSettings {
    pub monitor: String,
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
}

impl Default for ReduceLrSettings {
    fn default() -> Self {
        Self {
            monitor: "val_loss".to_string(),
            factor: 0.5,
            patience: 5,
            min_lr: 1e-7,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// 入力画像サイズ（正方形）
    pub image_size: u32,
    /// バッチサイズ
    pub batch_size: usize,
    /// ベースモデル凍結時のエポック数
    pub epochs: usize,
    /// ファインチューニングのエポック数
    pub fine_tune_epochs: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ファインチューニング時の学習率
    pub fine_tune_learning_rate: f64,
    /// プーリング直後のドロップアウト率
    pub dropout: f64,
    /// 分類ヘッドの中間ユニット数
    pub head_units: usize,
    /// 分類ヘッドのドロップアウト率
    pub head_dropout: f64,
    pub early_stopping: EarlyStoppingSettings,
    pub reduce_lr: ReduceLrSettings,
    /// ベストモデルのチェックポイント
    pub checkpoint_path: PathBuf,
    /// INT8量子化を行うか
    pub quantize: bool,
    /// 量子化の代表データとして使うバッチ数
    pub representative_batches: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            image_size: 224,
            batch_size: 32,
            epochs: 50,
            fine_tune_epochs: 20,
            learning_rate: 1e-3,
            fine_tune_learning_rate: 1e-4,
            dropout: 0.2,
            head_units: 512,
            head_dropout: 0.3,
            early_stopping: EarlyStoppingSettings::default(),
            reduce_lr: ReduceLrSettings::default(),
            checkpoint_path: PathBuf::from("models/plant_model_best.h5"),
            quantize: true,
            representative_batches: 100,
        }
    }
}

/// 学習データのデータ拡張設定（val/test はリスケールのみ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationSettings {
    pub rescale: f64,
    pub rotation_range: f64,
    pub width_shift_range: f64,
    pub height_shift_range: f64,
    pub brightness_range: [f64; 2],
    pub contrast_range: [f64; 2],
    pub horizontal_flip: bool,
    pub zoom_range: f64,
    pub fill_mode: String,
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            rescale: 1.0 / 255.0,
            rotation_range: 15.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            brightness_range: [0.8, 1.2],
            contrast_range: [0.8, 1.2],
            horizontal_flip: true,
            zoom_range: 0.2,
            fill_mode: "nearest".to_string(),
        }
    }
}

impl AugmentationSettings {
    /// 評価用（リスケールのみ）
    pub fn rescale_only(&self) -> Self {
        Self {
            rescale: self.rescale,
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            brightness_range: [1.0, 1.0],
            contrast_range: [1.0, 1.0],
            horizontal_flip: false,
            zoom_range: 0.0,
            fill_mode: self.fill_mode.clone(),
        }
    }
}

/// エクスポート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// 量子化済みモデルの出力先
    pub model_output: PathBuf,
    /// アプリ側のアセット配置先（コピー先の案内用）
    pub app_asset_path: PathBuf,
    /// 学習計画JSONの出力先
    pub plan_output: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            model_output: PathBuf::from("models/plant_model.tflite"),
            app_asset_path: PathBuf::from("app/src/main/assets/models/plant_model.tflite"),
            plan_output: PathBuf::from("models/training_plan.json"),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// データ分割設定
    pub partition: PartitionSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// データ拡張設定
    pub augmentation: AugmentationSettings,
    /// エクスポート設定
    pub export: ExportSettings,
    /// クラス一覧（モデル出力のインデックス順）
    pub classes: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            partition: PartitionSettings::default(),
            training: TrainingSettings::default(),
            augmentation: AugmentationSettings::default(),
            export: ExportSettings::default(),
            classes: PLANT_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// train/val/test の各ディレクトリ
    pub fn split_dir(&self, split: crate::types::Split) -> PathBuf {
        self.partition.output_dir.join(split.dir_name())
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("元画像: {}", self.partition.source_dir.display());
        println!("出力先: {}", self.partition.output_dir.display());
        println!("分割比率: {}", self.partition.ratios);
        println!("シード: {}", self.partition.seed);
        println!("拡張子: {}", self.partition.extensions.join(", "));
        println!("\n--- トレーニング設定 ---");
        println!("画像サイズ: {}x{}", self.training.image_size, self.training.image_size);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!(
            "エポック数: {} (+ファインチューニング {})",
            self.training.epochs, self.training.fine_tune_epochs
        );
        println!(
            "学習率: {} / {}",
            self.training.learning_rate, self.training.fine_tune_learning_rate
        );
        println!("量子化: {}", if self.training.quantize { "INT8" } else { "なし (float32)" });
        println!("\n--- エクスポート設定 ---");
        println!("モデル出力: {}", self.export.model_output.display());
        println!("アプリ配置先: {}", self.export.app_asset_path.display());
        println!("\nクラス ({}): {}", self.classes.len(), self.classes.join(", "));
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.partition.seed, 42);
        assert_eq!(config.partition.source_dir, PathBuf::from("data/raw"));
        assert_eq!(config.classes.len(), 17);
        assert_eq!(config.training.image_size, 224);
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.training.fine_tune_epochs, 20);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.partition.ratios, deserialized.partition.ratios);
        assert_eq!(config.classes, deserialized.classes);
        assert_eq!(config.augmentation, deserialized.augmentation);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "partition": { "seed": 7 }, "classes": ["basil", "mint"] }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.partition.seed, 7);
        assert_eq!(config.partition.output_dir, PathBuf::from("data"));
        assert_eq!(config.classes, vec!["basil", "mint"]);
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_load_or_default_handles_missing_and_broken_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(AppConfig::load_or_default(&missing).partition.seed, 42);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(AppConfig::load_or_default(&broken).classes.len(), 17);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.partition.seed = 1234;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.partition.seed, 1234);
    }

    #[test]
    fn test_rescale_only_disables_augmentation() {
        let aug = AugmentationSettings::default().rescale_only();
        assert!(!aug.horizontal_flip);
        assert_eq!(aug.rotation_range, 0.0);
        assert!((aug.rescale - 1.0 / 255.0).abs() < 1e-12);
    }
}
