//! train/val/test へのデータ分割
//!
//! `<source>/<class>/<image>` を `<output>/<split>/<class>/<image>` へコピーします。
//! シャッフルは `StdRng::seed_from_u64(seed)` で固定し、同じシードなら同じ割り当てになります。

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::class_folder::{scan_classes, IMAGE_EXTENSIONS};
use crate::error::DatasetError;
use crate::model::config::PartitionSettings;
use crate::types::{Split, SplitRatios};

/// 分割ごとの枚数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

/// 1クラス分の分割結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSplit {
    pub class_name: String,
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

impl ClassSplit {
    pub fn images(&self, split: Split) -> &[String] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn counts(&self) -> SplitCounts {
        SplitCounts {
            train: self.train.len(),
            val: self.val.len(),
            test: self.test.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.counts().total()
    }
}

/// 画像をシャッフルして切り捨て境界で3分割する
///
/// `train_end = floor(total * train)`、`val_end = train_end + floor(total * val)`。
/// 残りはすべて test に入る。
pub fn partition_images<R: Rng + ?Sized>(
    class_name: &str,
    mut images: Vec<String>,
    ratios: &SplitRatios,
    rng: &mut R,
) -> ClassSplit {
    images.shuffle(rng);

    let (train_end, val_end) = ratios.boundaries(images.len());
    let test = images.split_off(val_end);
    let val = images.split_off(train_end);

    ClassSplit {
        class_name: class_name.to_string(),
        train: images,
        val,
        test,
    }
}

/// 分割処理のオプション
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ratios: SplitRatios,
    pub seed: u64,
    pub extensions: Vec<String>,
    /// コピーせずに割り当てだけ計算する
    pub dry_run: bool,
    /// コピー前に既存のクラス出力フォルダを削除する
    pub clean: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self::from(&PartitionSettings::default())
    }
}

impl From<&PartitionSettings> for PartitionOptions {
    fn from(settings: &PartitionSettings) -> Self {
        let extensions = if settings.extensions.is_empty() {
            IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
        } else {
            settings.extensions.clone()
        };
        Self {
            source_dir: settings.source_dir.clone(),
            output_dir: settings.output_dir.clone(),
            ratios: settings.ratios,
            seed: settings.seed,
            extensions,
            dry_run: false,
            clean: false,
        }
    }
}

/// 分割処理の結果
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ratios: SplitRatios,
    pub seed: u64,
    pub classes: Vec<ClassSplit>,
    /// 画像が1枚もなかったクラス
    pub skipped: Vec<String>,
    pub dry_run: bool,
}

impl PartitionReport {
    pub fn totals(&self) -> SplitCounts {
        self.classes.iter().fold(SplitCounts::default(), |acc, c| {
            let counts = c.counts();
            SplitCounts {
                train: acc.train + counts.train,
                val: acc.val + counts.val,
                test: acc.test + counts.test,
            }
        })
    }

    pub fn class(&self, name: &str) -> Option<&ClassSplit> {
        self.classes.iter().find(|c| c.class_name == name)
    }
}

/// データセット分割器
pub struct DatasetPartitioner {
    options: PartitionOptions,
}

impl DatasetPartitioner {
    pub fn new(options: PartitionOptions) -> Self {
        Self { options }
    }

    /// 分割を実行する
    ///
    /// 元ディレクトリが存在しない、またはクラスフォルダが無い場合は
    /// 出力ディレクトリを作成せずにエラーを返す。
    pub fn run(&self) -> Result<PartitionReport, DatasetError> {
        let opts = &self.options;
        opts.ratios.validate()?;

        let classes = scan_classes(&opts.source_dir, opts.extensions.as_slice())?;
        if classes.is_empty() {
            return Err(DatasetError::NoClassFolders(opts.source_dir.clone()));
        }

        let names: Vec<&str> = classes.iter().map(|c| c.name.as_str()).collect();
        info!("{} 種類のクラスを検出しました: {}", classes.len(), names.join(", "));

        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut report = PartitionReport {
            source_dir: opts.source_dir.clone(),
            output_dir: opts.output_dir.clone(),
            ratios: opts.ratios,
            seed: opts.seed,
            classes: Vec::with_capacity(classes.len()),
            skipped: Vec::new(),
            dry_run: opts.dry_run,
        };

        for class in classes {
            if class.is_empty() {
                warn!("警告: {} に画像がありません。スキップします", class.name);
                report.skipped.push(class.name);
                continue;
            }

            info!("{} を処理中: {} 枚", class.name, class.images.len());
            let split = partition_images(&class.name, class.images, &opts.ratios, &mut rng);

            for s in Split::ALL {
                if !opts.dry_run {
                    self.copy_split(&class.path, &split, s)?;
                }
                info!("  {}: {} 枚", s, split.images(s).len());
            }

            report.classes.push(split);
        }

        let totals = report.totals();
        info!(
            "分割完了: train {} / val {} / test {} 枚 (出力先: {})",
            totals.train,
            totals.val,
            totals.test,
            opts.output_dir.display()
        );

        Ok(report)
    }

    fn copy_split(
        &self,
        class_dir: &Path,
        split: &ClassSplit,
        s: Split,
    ) -> Result<(), DatasetError> {
        let split_dir = self
            .options
            .output_dir
            .join(s.dir_name())
            .join(&split.class_name);

        if self.options.clean && split_dir.exists() {
            debug!("既存の出力フォルダを削除します: {}", split_dir.display());
            fs::remove_dir_all(&split_dir).map_err(|e| DatasetError::io(&split_dir, e))?;
        }
        fs::create_dir_all(&split_dir).map_err(|e| DatasetError::io(&split_dir, e))?;

        for image in split.images(s) {
            copy_preserving_mtime(&class_dir.join(image), &split_dir.join(image))?;
        }
        Ok(())
    }
}

/// 更新日時を保ったままファイルをコピーする
///
/// `fs::copy` は権限もコピーするため、読み取り専用の元画像からは読み取り専用のコピーができる。
/// 更新日時の設定には書き込み権限が要らないので、コピー先は読み取りで開く。
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> Result<(), DatasetError> {
    fs::copy(src, dst).map_err(|e| DatasetError::io(src, e))?;

    let modified = fs::metadata(src)
        .and_then(|m| m.modified())
        .map_err(|e| DatasetError::io(src, e))?;
    fs::File::open(dst)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| DatasetError::io(dst, e))?;
    Ok(())
}
