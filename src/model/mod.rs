pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::ArtifactMetadata;
pub use model_storage::{
    load_bundle, load_bundle_metadata, print_metadata_info, save_bundle, write_model_file,
};
pub use config::{
    AppConfig, AugmentationSettings, ExportSettings, PartitionSettings, TrainingSettings,
    PLANT_CLASSES,
};
