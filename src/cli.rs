//! コマンドライン定義と各コマンドの実行

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::{
    verify_images, write_manifest_csv, write_summary_json, DatasetPartitioner, ImageFolderDataset,
    PartitionOptions,
};
use crate::error::{DatasetError, TrainingError};
use crate::model::config::AppConfig;
use crate::model::model_storage::print_metadata_info;
use crate::training::TrainingPipeline;
use crate::types::SplitRatios;

/// 植物認識モデル用のデータ準備ツール
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "plant_data_prep")]
#[command(version)]
#[command(about = "Prepare plant image datasets and package the recognition model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 設定ファイル
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 警告とエラーのみ出力
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// クラスごとの画像フォルダを train/val/test に分割する
    Split(SplitArgs),

    /// 画像フォルダの枚数を集計し、読み込めない画像を検出する
    Inspect(InspectArgs),

    /// 分割済みデータを確認し、学習計画を書き出す
    Plan(PlanArgs),

    /// 外部で変換したモデルを所定の場所に配置し、メタデータ付きで保存する
    Package(PackageArgs),

    /// 現在の設定を表示する
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct SplitArgs {
    /// 元画像のディレクトリ（例: data/raw）
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// train/val/test を作成するディレクトリ（例: data）
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// ランダムシード
    #[arg(long)]
    pub seed: Option<u64>,

    /// train の比率（--val と --test も同時に指定し、合計1.0にする）
    #[arg(long, requires_all = ["val", "test"])]
    pub train: Option<f64>,

    /// val の比率
    #[arg(long, requires_all = ["train", "test"])]
    pub val: Option<f64>,

    /// test の比率
    #[arg(long, requires_all = ["train", "val"])]
    pub test: Option<f64>,

    /// コピーせずに割り当てだけ表示する
    #[arg(long)]
    pub dry_run: bool,

    /// 既存の出力フォルダを削除してからコピーする
    #[arg(long)]
    pub clean: bool,

    /// 割り当てのCSVとサマリーJSONを出力先に書き出す
    #[arg(long)]
    pub manifest: bool,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// 対象ディレクトリ（省略時は元画像ディレクトリ）
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct PlanArgs {
    /// train/val/test を含むディレクトリ
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// 学習計画の出力先
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct PackageArgs {
    /// 外部フレームワークが出力したモデルファイル
    #[arg(long)]
    pub model: PathBuf,

    /// 配置先（省略時は設定の model_output）
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ConfigArgs {
    /// デフォルト設定をファイルに書き出す
    #[arg(long)]
    pub init: bool,
}

/// ログ出力の初期化（RUST_LOG があればそちらを優先）
pub fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

pub fn run_command(cli: Cli) -> Result<()> {
    let load = || AppConfig::load_or_default(&cli.config);
    match &cli.command {
        Command::Split(args) => run_split(load(), args),
        Command::Inspect(args) => run_inspect(&load(), args),
        Command::Plan(args) => run_plan(load(), args),
        Command::Package(args) => run_package(load(), args),
        Command::Config(args) => run_config(&cli.config, args),
    }
}

fn print_layout_hint(root: &Path) {
    eprintln!("Please create this directory and organize images by plant name:");
    eprintln!("{}", root.join("basil").join("image1.jpg").display());
    eprintln!("{}", root.join("basil").join("image2.jpg").display());
    eprintln!("{}", root.join("mint").join("image1.jpg").display());
    eprintln!("...");
}

fn run_split(mut config: AppConfig, args: &SplitArgs) -> Result<()> {
    if let Some(source) = &args.source {
        config.partition.source_dir = source.clone();
    }
    if let Some(output) = &args.output {
        config.partition.output_dir = output.clone();
    }
    if let Some(seed) = args.seed {
        config.partition.seed = seed;
    }
    if let (Some(train), Some(val), Some(test)) = (args.train, args.val, args.test) {
        config.partition.ratios = SplitRatios::new(train, val, test)?;
    }

    let mut options = PartitionOptions::from(&config.partition);
    options.dry_run = args.dry_run;
    options.clean = args.clean;

    let report = match DatasetPartitioner::new(options).run() {
        Ok(report) => report,
        Err(DatasetError::SourceMissing(root)) => {
            eprintln!("ERROR: Source directory not found: {}", root.display());
            print_layout_hint(&root);
            return Ok(());
        }
        Err(DatasetError::NoClassFolders(root)) => {
            eprintln!("No plant folders found in {}", root.display());
            print_layout_hint(&root);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if args.manifest && !report.dry_run {
        let csv_path = config.partition.output_dir.join("splits.csv");
        let rows = write_manifest_csv(&report, &csv_path)?;
        let summary_path = config.partition.output_dir.join("split_summary.json");
        write_summary_json(&report, &summary_path)?;
        info!("マニフェストを書き出しました: {} ({} 行)", csv_path.display(), rows);
    } else if args.manifest {
        warn!("--dry-run のためマニフェストは書き出しません");
    }

    let totals = report.totals();
    println!("\n{}", "=".repeat(50));
    if report.dry_run {
        println!("Dry run: no files were copied");
    } else {
        println!("Data organization complete!");
    }
    println!(
        "Train/Val/Test splits ({}/{}/{}) created in: {}",
        totals.train,
        totals.val,
        totals.test,
        config.partition.output_dir.display()
    );
    if !report.skipped.is_empty() {
        println!("Skipped (no images): {}", report.skipped.join(", "));
    }
    println!("{}", "=".repeat(50));
    Ok(())
}

fn run_inspect(config: &AppConfig, args: &InspectArgs) -> Result<()> {
    let dir = args.dir.clone().unwrap_or_else(|| config.partition.source_dir.clone());
    let dataset = ImageFolderDataset::from_directory(&dir)
        .with_context(|| format!("Failed to load image folder: {}", dir.display()))?;

    println!("=== {} ===", dir.display());
    for (name, count) in dataset.class_names().iter().zip(dataset.class_counts()) {
        println!("  {:<16} {:>6} 枚", name, count);
    }
    println!("合計: {} 枚 / {} クラス", dataset.len(), dataset.num_classes());

    let report = verify_images(&dataset);
    for ((w, h), count) in &report.dimensions {
        println!("  サイズ {}x{}: {} 枚", w, h, count);
    }
    if report.is_ok() {
        println!("すべての画像を読み込めました ({} 枚)", report.checked);
    } else {
        println!("読み込めない画像: {} 枚", report.unreadable.len());
        for (path, err) in &report.unreadable {
            println!("  {}: {}", path.display(), err);
        }
    }
    Ok(())
}

fn run_plan(mut config: AppConfig, args: &PlanArgs) -> Result<()> {
    if let Some(data) = &args.data {
        config.partition.output_dir = data.clone();
    }
    let output = args.output.clone().unwrap_or_else(|| config.export.plan_output.clone());
    let pipeline = TrainingPipeline::new(config);

    let data = match pipeline.preflight() {
        Ok(data) => data,
        Err(TrainingError::TrainDirMissing(dir)) => {
            eprintln!("ERROR: Training directory not found: {}", dir.display());
            eprintln!("Please organize your images in the following structure:");
            eprintln!("{}", dir.join("plant_name1").display());
            eprintln!("{}", dir.join("plant_name2").display());
            eprintln!("...");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let plan = pipeline.plan(&data);
    plan.display();
    plan.save(&output)?;
    info!("学習計画を書き出しました: {}", output.display());
    Ok(())
}

fn run_package(mut config: AppConfig, args: &PackageArgs) -> Result<()> {
    if let Some(output) = &args.output {
        config.export.model_output = output.clone();
    }
    let app_asset_path = config.export.app_asset_path.clone();
    let outcome = TrainingPipeline::new(config).package(&args.model)?;
    print_metadata_info(&outcome.metadata);

    println!("\n{}", "=".repeat(50));
    println!("Model saved to: {}", outcome.model_path.display());
    println!("Bundle saved to: {}", outcome.bundle_path.display());
    println!("Copy this file to: {}", app_asset_path.display());
    println!("{}", "=".repeat(50));
    Ok(())
}

fn run_config(path: &Path, args: &ConfigArgs) -> Result<()> {
    if args.init {
        if path.exists() {
            anyhow::bail!("config file already exists: {}", path.display());
        }
        AppConfig::default().save(path)?;
        println!("設定ファイルを保存しました: {}", path.display());
        return Ok(());
    }
    AppConfig::load_or_default(path).display();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("plant_data_prep").chain(args.iter().copied()))
    }

    fn parse(args: &[&str]) -> Cli {
        try_parse(args).unwrap()
    }

    fn make_images(dir: &Path, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            fs::write(dir.join(format!("{}.jpg", i)), b"x").unwrap();
        }
    }

    #[test]
    fn test_parse_split_with_ratios() {
        let cli = parse(&[
            "split", "--seed", "7", "--train", "0.8", "--val", "0.1", "--test", "0.1", "--dry-run",
        ]);
        match cli.command {
            Command::Split(args) => {
                assert_eq!(args.seed, Some(7));
                assert_eq!(args.train, Some(0.8));
                assert_eq!(args.val, Some(0.1));
                assert_eq!(args.test, Some(0.1));
                assert!(args.dry_run);
                assert!(!args.clean);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn test_ratios_must_be_given_together() {
        assert!(try_parse(&["split", "--train", "0.8"]).is_err());
        assert!(try_parse(&["split", "--train", "0.8", "--val", "0.2"]).is_err());
        assert!(try_parse(&["split", "--test", "0.2"]).is_err());
        assert!(try_parse(&["split"]).is_ok());
    }

    #[test]
    fn test_split_ratio_flags_are_applied() {
        let dir = TempDir::new().unwrap();
        make_images(&dir.path().join("raw/mint"), 10);
        let cli = parse(&[
            "split",
            "--source",
            dir.path().join("raw").to_str().unwrap(),
            "--output",
            dir.path().join("data").to_str().unwrap(),
            "--train",
            "0.6",
            "--val",
            "0.2",
            "--test",
            "0.2",
            "--config",
            dir.path().join("config.json").to_str().unwrap(),
        ]);
        run_command(cli).unwrap();

        let count = |split: &str| {
            fs::read_dir(dir.path().join("data").join(split).join("mint")).unwrap().count()
        };
        assert_eq!(count("train"), 6);
        assert_eq!(count("val"), 2);
        assert_eq!(count("test"), 2);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["plant_data_prep", "-v", "-q", "config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_package_requires_model() {
        assert!(Cli::try_parse_from(["plant_data_prep", "package"]).is_err());
    }

    #[test]
    fn test_split_missing_source_exits_cleanly() {
        let dir = TempDir::new().unwrap();
        let cli = parse(&[
            "split",
            "--source",
            dir.path().join("raw").to_str().unwrap(),
            "--output",
            dir.path().join("data").to_str().unwrap(),
            "--config",
            dir.path().join("config.json").to_str().unwrap(),
        ]);
        run_command(cli).unwrap();
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn test_split_writes_manifest() {
        let dir = TempDir::new().unwrap();
        make_images(&dir.path().join("raw/basil"), 20);
        let cli = parse(&[
            "split",
            "--source",
            dir.path().join("raw").to_str().unwrap(),
            "--output",
            dir.path().join("data").to_str().unwrap(),
            "--manifest",
            "--config",
            dir.path().join("config.json").to_str().unwrap(),
        ]);
        run_command(cli).unwrap();

        let csv = fs::read_to_string(dir.path().join("data/splits.csv")).unwrap();
        assert_eq!(csv.lines().count(), 21);
        assert!(dir.path().join("data/split_summary.json").exists());
        assert_eq!(fs::read_dir(dir.path().join("data/train/basil")).unwrap().count(), 14);
    }

    #[test]
    fn test_invalid_ratio_override_is_error() {
        let dir = TempDir::new().unwrap();
        let cli = parse(&[
            "split",
            "--train",
            "0.5",
            "--val",
            "0.5",
            "--test",
            "0.5",
            "--config",
            dir.path().join("config.json").to_str().unwrap(),
        ]);
        assert!(run_command(cli).is_err());
    }

    #[test]
    fn test_plan_missing_train_dir_exits_cleanly() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("plan.json");
        let cli = parse(&[
            "plan",
            "--data",
            dir.path().join("data").to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
            "--config",
            dir.path().join("config.json").to_str().unwrap(),
        ]);
        run_command(cli).unwrap();
        assert!(!out.exists());
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cli = parse(&["config", "--init", "--config", path.to_str().unwrap()]);
        run_command(cli.clone()).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().partition.seed, 42);
        assert!(run_command(cli).is_err());
    }
}
