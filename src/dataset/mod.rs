pub mod class_folder;
pub mod partition;
pub mod manifest;
pub mod image_folder;

pub use class_folder::{scan_classes, ClassFolder, IMAGE_EXTENSIONS};
pub use partition::{
    partition_images, ClassSplit, DatasetPartitioner, PartitionOptions, PartitionReport,
    SplitCounts,
};
pub use manifest::{write_manifest_csv, write_summary_json, ManifestRecord, PartitionSummary};
pub use image_folder::{verify_images, ImageFolderDataset, VerifyReport};
