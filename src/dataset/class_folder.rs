//! クラスフォルダの走査

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// 既定で対象とする画像拡張子
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 1クラス分の画像フォルダ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFolder {
    /// クラス名（フォルダ名）
    pub name: String,
    pub path: PathBuf,
    /// 画像ファイル名（名前順）
    pub images: Vec<String>,
}

impl ClassFolder {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// ファイル名が対象の拡張子で終わるかどうか（大文字小文字は区別しない）
///
/// `.jpg` のように拡張子だけの名前も対象に含める。
pub fn has_image_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    extensions.iter().any(|e| {
        let ext = e.as_ref().trim_start_matches('.').to_lowercase();
        !ext.is_empty() && name.ends_with(&format!(".{}", ext))
    })
}

/// ディレクトリ直下の画像ファイル名を名前順で返す
///
/// UTF-8 でない画像ファイル名は分割先に含められないため `InvalidFileName` を返す。
pub fn list_images<S: AsRef<str>>(
    dir: &Path,
    extensions: &[S],
) -> Result<Vec<String>, DatasetError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))? {
        let entry = entry.map_err(|e| DatasetError::io(dir, e))?;
        let path = entry.path();

        if path.is_file() && has_image_extension(&path, extensions) {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| DatasetError::InvalidFileName(path.clone()))?;
            images.push(name.to_string());
        }
    }
    // read_dir の列挙順はプラットフォーム依存なので固定する
    images.sort();
    Ok(images)
}

/// ルート直下のサブディレクトリをクラスとして走査する
pub fn scan_classes<S: AsRef<str>>(
    root: &Path,
    extensions: &[S],
) -> Result<Vec<ClassFolder>, DatasetError> {
    if !root.is_dir() {
        return Err(DatasetError::SourceMissing(root.to_path_buf()));
    }

    let mut classes = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| DatasetError::io(root, e))? {
        let entry = entry.map_err(|e| DatasetError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DatasetError::InvalidClassName(path.clone()))?
            .to_string();
        let images = list_images(&path, extensions)?;
        classes.push(ClassFolder { name, path, images });
    }

    classes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/leaf.JPG"), &IMAGE_EXTENSIONS));
        assert!(has_image_extension(Path::new("leaf.jpeg"), &IMAGE_EXTENSIONS));
        assert!(has_image_extension(Path::new("leaf.Png"), &IMAGE_EXTENSIONS));
        assert!(!has_image_extension(Path::new("leaf.gif"), &IMAGE_EXTENSIONS));
        assert!(!has_image_extension(Path::new("README"), &IMAGE_EXTENSIONS));
        assert!(has_image_extension(Path::new("leaf.webp"), &[".webp"]));
    }

    #[test]
    fn test_bare_extension_name_is_image() {
        assert!(has_image_extension(Path::new(".jpg"), &IMAGE_EXTENSIONS));
        assert!(has_image_extension(Path::new("basil/.PNG"), &IMAGE_EXTENSIONS));
        assert!(!has_image_extension(Path::new("jpg"), &IMAGE_EXTENSIONS));

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("basil/.jpg"));
        touch(&dir.path().join("basil/leaf.jpg"));
        let images = list_images(&dir.path().join("basil"), &IMAGE_EXTENSIONS).unwrap();
        assert_eq!(images, vec![".jpg", "leaf.jpg"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_image_name_is_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let class_dir = dir.path().join("basil");
        touch(&class_dir.join("ok.jpg"));
        let bad = class_dir.join(OsStr::from_bytes(b"\xff.jpg"));
        fs::write(&bad, b"x").unwrap();

        match list_images(&class_dir, &IMAGE_EXTENSIONS) {
            Err(DatasetError::InvalidFileName(p)) => assert_eq!(p, bad),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            scan_classes(dir.path(), &IMAGE_EXTENSIONS),
            Err(DatasetError::InvalidFileName(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_non_image_is_ignored() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let class_dir = dir.path().join("basil");
        touch(&class_dir.join("ok.jpg"));
        fs::write(class_dir.join(OsStr::from_bytes(b"\xff.txt")), b"x").unwrap();

        assert_eq!(list_images(&class_dir, &IMAGE_EXTENSIONS).unwrap(), vec!["ok.jpg"]);
    }

    #[test]
    fn test_scan_classes_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("mint/b.png"));
        touch(&root.join("mint/a.JPG"));
        touch(&root.join("mint/notes.txt"));
        touch(&root.join("basil/1.jpeg"));
        fs::create_dir_all(root.join("okra")).unwrap();
        touch(&root.join("stray.jpg"));

        let classes = scan_classes(root, &IMAGE_EXTENSIONS).unwrap();
        let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["basil", "mint", "okra"]);
        assert_eq!(classes[1].images, vec!["a.JPG", "b.png"]);
        assert!(classes[2].is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("raw");
        match scan_classes(&missing, &IMAGE_EXTENSIONS) {
            Err(DatasetError::SourceMissing(p)) => assert_eq!(p, missing),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_nested_directories_are_not_images() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("basil/sub/deep.jpg"));
        touch(&root.join("basil/top.jpg"));
        let classes = scan_classes(root, &IMAGE_EXTENSIONS).unwrap();
        assert_eq!(classes[0].images, vec!["top.jpg"]);
    }
}
