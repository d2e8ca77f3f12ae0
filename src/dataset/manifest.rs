//! 分割結果の記録（CSVマニフェストとJSONサマリー）

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::dataset::partition::{PartitionReport, SplitCounts};
use crate::types::{Split, SplitRatios};

/// マニフェストの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub split: Split,
    pub class: String,
    pub file: String,
}

/// 分割結果のサマリー
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub source_dir: String,
    pub output_dir: String,
    pub seed: u64,
    pub ratios: SplitRatios,
    pub classes: BTreeMap<String, SplitCounts>,
    pub skipped: Vec<String>,
    pub totals: SplitCounts,
    /// 作成日時（RFC3339）
    pub created_at: String,
}

impl PartitionSummary {
    pub fn from_report(report: &PartitionReport) -> Self {
        Self {
            source_dir: report.source_dir.to_string_lossy().to_string(),
            output_dir: report.output_dir.to_string_lossy().to_string(),
            seed: report.seed,
            ratios: report.ratios,
            classes: report
                .classes
                .iter()
                .map(|c| (c.class_name.clone(), c.counts()))
                .collect(),
            skipped: report.skipped.clone(),
            totals: report.totals(),
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// split → class → file の順に並べたレコード
pub fn manifest_records(report: &PartitionReport) -> Vec<ManifestRecord> {
    let mut records = Vec::with_capacity(report.totals().total());
    for split in Split::ALL {
        for class in &report.classes {
            let mut files: Vec<&String> = class.images(split).iter().collect();
            files.sort();
            records.extend(files.into_iter().map(|file| ManifestRecord {
                split,
                class: class.class_name.clone(),
                file: file.clone(),
            }));
        }
    }
    records
}

/// マニフェストをCSVで書き出し、書き込んだ行数を返す
pub fn write_manifest_csv(report: &PartitionReport, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .context(format!("Failed to create manifest file: {:?}", path))?;

    let records = manifest_records(report);
    for record in &records {
        writer.serialize(record).context("Failed to write manifest record")?;
    }
    writer.flush().context("Failed to flush manifest")?;

    Ok(records.len())
}

/// マニフェストCSVを読み込む
pub fn read_manifest_csv(path: &Path) -> Result<Vec<ManifestRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(format!("Failed to open manifest file: {:?}", path))?;

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: ManifestRecord = result?;
        records.push(record);
    }
    Ok(records)
}

/// サマリーをJSONで書き出す
pub fn write_summary_json(report: &PartitionReport, path: &Path) -> Result<PartitionSummary> {
    let summary = PartitionSummary::from_report(report);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }
    let json =
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary to JSON")?;
    fs::write(path, json).context(format!("Failed to write summary: {:?}", path))?;
    Ok(summary)
}
