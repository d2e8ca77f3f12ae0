//! モデル成果物の永続化
//!
//! アプリに組み込むモデルは固定パスにそのまま書き出します。
//! 配布・保管用にはメタデータと合わせてTar.gz形式の1ファイルにまとめます。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズなど）
//! - model.tflite    - 量子化済みモデル（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ArtifactMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.tflite";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }
    Ok(())
}

/// モデルバイナリを指定パスに書き出す（親ディレクトリは自動作成）
pub fn write_model_file(path: &Path, model_binary: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, model_binary).context(format!("Failed to write model file: {:?}", path))?;
    Ok(())
}

/// バンドルの保存先（.gzで終わっていなければ .tar.gz を付与）
pub fn bundle_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// モデルファイルと並べて置くバンドルのパス
///
/// 最後の拡張子を `tar.gz` に置き換えるので、モデルのパスと同じにはならない。
/// （`model.tflite.gz` なら `model.tflite.tar.gz`）
pub fn bundle_path_for_model(model_path: &Path) -> PathBuf {
    model_path.with_extension("tar.gz")
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .context(format!("Failed to add {} to tar", name))?;
    Ok(())
}

/// メタデータと共にモデルをTar.gz形式で保存し、保存先パスを返す
pub fn save_bundle(
    output_path: &Path,
    metadata: &ArtifactMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = bundle_path(output_path);
    ensure_parent(&tar_gz_path)?;

    let tar_gz_file = File::create(&tar_gz_path)
        .context(format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // gzipストリームまで閉じる
    tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?
        .finish()
        .context("Failed to finish gzip stream")?;

    Ok(tar_gz_path)
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Tar.gzからメタデータを読み込む
pub fn load_bundle_metadata(tar_gz_path: &Path) -> Result<ArtifactMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ArtifactMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive", METADATA_ENTRY))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_bundle(tar_gz_path: &Path) -> Result<(ArtifactMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ArtifactMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ArtifactMetadata::from_json_string(&json_str)?);
            }
            Some(MODEL_ENTRY) => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("{} not found in tar.gz archive", METADATA_ENTRY)),
        (_, None) => Err(anyhow::anyhow!("{} not found in tar.gz archive", MODEL_ENTRY)),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ArtifactMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("クラス数: {}", metadata.num_classes());
    println!("クラスラベル: {}", metadata.class_labels.join(", "));
    println!("入力サイズ: {}x{}", metadata.input_size, metadata.input_size);
    println!("量子化: {}", if metadata.quantized { "INT8" } else { "なし" });
    println!("モデルサイズ: {:.2} MB", metadata.size_mb());
    if let Some(m) = &metadata.metrics {
        println!("テスト精度: {:.4} (Top-3: {:.4})", m.accuracy, m.top3_accuracy);
    }
    println!("作成日時: {}", metadata.created_at);
    println!("========================");
}
