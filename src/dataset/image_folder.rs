//! クラスごとのフォルダ構成から画像データセットを読み込む

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::class_folder::{list_images, IMAGE_EXTENSIONS};
use crate::error::DatasetError;

/// 画像データセット（パスとクラスIDのみ保持）
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    root: PathBuf,
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl ImageFolderDataset {
    /// ディレクトリから読み込む。クラスIDはフォルダ名のアルファベット順
    pub fn from_directory(data_dir: &Path) -> Result<Self, DatasetError> {
        if !data_dir.is_dir() {
            return Err(DatasetError::DirectoryMissing(data_dir.to_path_buf()));
        }

        let mut class_names = Vec::new();
        for entry in std::fs::read_dir(data_dir).map_err(|e| DatasetError::io(data_dir, e))? {
            let entry = entry.map_err(|e| DatasetError::io(data_dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                let class_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| DatasetError::InvalidClassName(path.clone()))?
                    .to_string();
                class_names.push(class_name);
            }
        }
        class_names.sort();

        Self::from_directory_with_order(data_dir, &class_names)
    }

    /// 指定された順序でディレクトリから読み込む
    pub fn from_directory_with_order(
        data_dir: &Path,
        class_order: &[String],
    ) -> Result<Self, DatasetError> {
        if !data_dir.is_dir() {
            return Err(DatasetError::DirectoryMissing(data_dir.to_path_buf()));
        }

        let mut samples = Vec::new();

        // class_orderに従ってクラスIDを割り当て
        for (class_id, class_name) in class_order.iter().enumerate() {
            let class_dir = data_dir.join(class_name);
            if !class_dir.is_dir() {
                debug!("クラスディレクトリが存在しません: {}", class_dir.display());
                continue;
            }

            for image in list_images(&class_dir, &IMAGE_EXTENSIONS)? {
                samples.push((class_dir.join(image), class_id));
            }
        }

        info!(
            "{}: {} 枚 / {} クラス",
            data_dir.display(),
            samples.len(),
            class_order.len()
        );

        Ok(Self {
            root: data_dir.to_path_buf(),
            samples,
            class_names: class_order.to_vec(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスごとのサンプル数（クラスID順）
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for (_, id) in &self.samples {
            counts[*id] += 1;
        }
        counts
    }

    /// 画像が1枚もないクラス
    pub fn empty_classes(&self) -> Vec<&str> {
        self.class_counts()
            .iter()
            .zip(&self.class_names)
            .filter(|(count, _)| **count == 0)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// 1エポックあたりのバッチ数（端数バッチを含む）
    pub fn num_batches(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.samples.len().div_ceil(batch_size)
    }
}

/// 画像検証の結果
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: usize,
    /// 読み込めなかった画像とエラー内容
    pub unreadable: Vec<(PathBuf, String)>,
    /// 画像サイズ (幅, 高さ) ごとの枚数
    pub dimensions: BTreeMap<(u32, u32), usize>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.unreadable.is_empty()
    }
}

/// すべての画像のヘッダーを読み、壊れたファイルを洗い出す
pub fn verify_images(dataset: &ImageFolderDataset) -> VerifyReport {
    let mut report = VerifyReport::default();

    for (path, _) in dataset.samples() {
        report.checked += 1;
        match image::image_dimensions(path) {
            Ok(dims) => *report.dimensions.entry(dims).or_insert(0) += 1,
            Err(e) => {
                warn!("警告: 画像読み込み失敗 {}: {}", path.display(), e);
                report.unreadable.push((path.clone(), e.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_png(path: &Path, w: u32, h: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbImage::new(w, h).save(path).unwrap();
    }

    #[test]
    fn test_classes_sorted_alphabetically() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("tomato/1.png"), 4, 4);
        write_png(&dir.path().join("basil/1.png"), 4, 4);
        write_png(&dir.path().join("basil/2.png"), 4, 4);
        fs::create_dir_all(dir.path().join("mint")).unwrap();

        let ds = ImageFolderDataset::from_directory(dir.path()).unwrap();
        assert_eq!(ds.class_names(), &["basil", "mint", "tomato"]);
        assert_eq!(ds.class_counts(), vec![2, 0, 1]);
        assert_eq!(ds.empty_classes(), vec!["mint"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.samples()[2].1, 2);
    }

    #[test]
    fn test_explicit_class_order() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("mint/a.png"), 4, 4);
        write_png(&dir.path().join("basil/a.png"), 4, 4);

        let order = vec!["mint".to_string(), "okra".to_string(), "basil".to_string()];
        let ds = ImageFolderDataset::from_directory_with_order(dir.path(), &order).unwrap();
        assert_eq!(ds.num_classes(), 3);
        assert_eq!(ds.class_counts(), vec![1, 0, 1]);
        assert_eq!(ds.samples()[0].1, 0);
        assert_eq!(ds.samples()[1].1, 2);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = ImageFolderDataset::from_directory(&dir.path().join("train"));
        assert!(matches!(result, Err(DatasetError::DirectoryMissing(_))));
    }

    #[test]
    fn test_num_batches() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write_png(&dir.path().join(format!("chili/{}.png", i)), 2, 2);
        }
        let ds = ImageFolderDataset::from_directory(dir.path()).unwrap();
        assert_eq!(ds.num_batches(2), 3);
        assert_eq!(ds.num_batches(32), 1);
        assert_eq!(ds.num_batches(0), 0);
    }

    #[test]
    fn test_verify_reports_broken_images() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("basil/good.png"), 8, 6);
        write_png(&dir.path().join("basil/also_good.png"), 8, 6);
        fs::write(dir.path().join("basil/broken.png"), b"not a png").unwrap();

        let ds = ImageFolderDataset::from_directory(dir.path()).unwrap();
        let report = verify_images(&ds);
        assert_eq!(report.checked, 3);
        assert!(!report.is_ok());
        assert_eq!(report.unreadable.len(), 1);
        assert!(report.unreadable[0].0.ends_with("broken.png"));
        assert_eq!(report.dimensions.get(&(8, 6)), Some(&2));
    }
}
