use std::path::PathBuf;
use thiserror::Error;

/// The main error type for canonlabel operations.
#[derive(Debug, Error)]
pub enum CanonlabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse COCO annotation index {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid COCO layout at {path}: {message}")]
    CocoLayoutInvalid { path: PathBuf, message: String },

    #[error("Invalid YOLO layout at {path}: {message}")]
    YoloLayoutInvalid { path: PathBuf, message: String },

    #[error("Failed to parse YOLO summary {path}: {message}")]
    YoloSummaryInvalid { path: PathBuf, message: String },

    #[error("Failed to parse YOLO summary YAML {path}: {source}")]
    YoloSummaryYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse YOLO summary TOML {path}: {source}")]
    YoloSummaryTomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "Clip {clip} has {label_files} label file(s) but {image_files} image file(s)"
    )]
    YoloClipMismatch {
        clip: PathBuf,
        label_files: usize,
        image_files: usize,
    },

    #[error("No image found for label file {label_path} (expected {expected})")]
    YoloImageNotFound {
        label_path: PathBuf,
        expected: PathBuf,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    YoloImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Failed to parse YOLO label {path}:{line}: {message}")]
    YoloLabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Raw category id {raw_id} in {context} is not declared in the category table")]
    UnknownRawCategory { raw_id: u64, context: String },

    #[error("Duplicate class name '{0}' in category table")]
    DuplicateClassName(String),

    #[error("Duplicate raw category id {0} in category table")]
    DuplicateRawCategory(u64),

    #[error("Index {index} is out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(
        "Transform for sample {index} returned {boxes} box(es) but {labels} label(s)"
    )]
    TransformMismatch {
        index: usize,
        boxes: usize,
        labels: usize,
    },

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Target encoding failed: {0}")]
    TargetEncoding(String),

    #[error("Invalid image dimensions {width}x{height} (must be positive)")]
    InvalidImageDimensions { width: usize, height: usize },

    #[error("Invalid image array: {0}")]
    InvalidImageArray(String),

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Visualization failed: {0}")]
    Visualization(String),

    #[error("Failed to render JSON: {0}")]
    JsonRender(#[from] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
