//! YOLO-backed annotation source for per-video frame dumps.
//!
//! Expected layout:
//!
//! ```text
//! root/
//!   summary.toml             (or summary.yaml) with a `categories` table
//!   train/
//!     <clip>/
//!       det_labels/labels_<frame>.txt
//!       det_stills/stills_<frame>.jpg
//!   val/
//!     ...
//! ```
//!
//! Each label row is `raw_id x_center y_center width height [confidence]`
//! with geometry normalized to `[0, 1]`. Rows are scaled to the pixel size
//! of the paired still and remapped through the category table, so the
//! canonical records match the COCO reader's. Negative extents are clamped
//! to zero with a warning; an unparsable confidence is ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use super::catalog::{ClassCatalog, RawCategoryMap};
use super::geometry::{xywh_extents_clamped, xyxy_norm_to_abs, yolo_to_xyxy};
use super::ids::RawCategoryId;
use super::record::{AnnotationRecord, ImageRef};
use super::source::{AnnotationSource, Split};
use crate::error::CanonlabelError;

const SUMMARY_TOML: &str = "summary.toml";
const SUMMARY_YAML: [&str; 2] = ["summary.yaml", "summary.yml"];
const LABELS_DIR: &str = "det_labels";
const STILLS_DIR: &str = "det_stills";
const LABEL_PREFIX: &str = "labels_";
const STILL_PREFIX: &str = "stills_";
const LABEL_EXTENSION: &str = "txt";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Canonical records read from one split of a clip-organized YOLO dataset.
#[derive(Debug)]
pub struct YoloSource {
    root: PathBuf,
    split: Split,
    records: Vec<AnnotationRecord>,
    catalog: ClassCatalog,
    category_map: RawCategoryMap,
    clip_count: usize,
}

impl YoloSource {
    /// Reads the category table at `root` and every clip under `root/<split>`.
    ///
    /// # Errors
    /// Any layout problem aborts the whole load: a clip whose label and still
    /// counts differ, a label without its still, a malformed row, or a raw
    /// category id missing from the table.
    pub fn open(root: &Path, split: Split) -> Result<Self, CanonlabelError> {
        let categories = read_summary(root)?;
        let catalog =
            ClassCatalog::with_background(categories.iter().map(|(_, name)| name.clone()))?;
        let category_map =
            RawCategoryMap::from_ordered(categories.iter().map(|(raw, _)| *raw))?;

        let split_dir = root.join(split.as_str());
        if !split_dir.is_dir() {
            return Err(CanonlabelError::YoloLayoutInvalid {
                path: split_dir,
                message: format!("missing {}/ split directory", split),
            });
        }

        let clips = list_clip_dirs(&split_dir)?;
        let mut records = Vec::new();
        for clip in &clips {
            let before = records.len();
            read_clip(clip, &category_map, &mut records)?;
            debug!(
                "Read {} frame(s) from clip {}",
                records.len() - before,
                clip.display()
            );
        }

        info!(
            "Loaded {} frame(s) from {} clip(s) in {}",
            records.len(),
            clips.len(),
            split_dir.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            split,
            records,
            catalog,
            category_map,
            clip_count: clips.len(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn category_map(&self) -> &RawCategoryMap {
        &self.category_map
    }

    /// Number of clip directories scanned.
    pub fn clip_count(&self) -> usize {
        self.clip_count
    }
}

impl AnnotationSource for YoloSource {
    fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    fn format_name(&self) -> &'static str {
        "yolo"
    }
}

// ============================================================================
// Category table
// ============================================================================

enum Scalar {
    Int(u64),
    Text(String),
}

fn read_summary(root: &Path) -> Result<Vec<(RawCategoryId, String)>, CanonlabelError> {
    let toml_path = root.join(SUMMARY_TOML);
    if toml_path.is_file() {
        let text = fs::read_to_string(&toml_path).map_err(CanonlabelError::Io)?;
        return parse_summary_toml(&text, &toml_path);
    }

    for name in SUMMARY_YAML {
        let yaml_path = root.join(name);
        if yaml_path.is_file() {
            let text = fs::read_to_string(&yaml_path).map_err(CanonlabelError::Io)?;
            return parse_summary_yaml(&text, &yaml_path);
        }
    }

    Err(CanonlabelError::YoloLayoutInvalid {
        path: root.to_path_buf(),
        message: format!(
            "missing {} (or {}) category table",
            SUMMARY_TOML,
            SUMMARY_YAML.join(" / ")
        ),
    })
}

fn parse_summary_toml(
    text: &str,
    path: &Path,
) -> Result<Vec<(RawCategoryId, String)>, CanonlabelError> {
    let doc: toml::Table =
        toml::from_str(text).map_err(|source| CanonlabelError::YoloSummaryTomlParse {
            path: path.to_path_buf(),
            source,
        })?;

    let Some(toml::Value::Table(categories)) = doc.get("categories") else {
        return Err(missing_categories(path));
    };

    categories
        .iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(name) => Scalar::Text(name.clone()),
                toml::Value::Integer(raw) if *raw >= 0 => Scalar::Int(*raw as u64),
                other => {
                    return Err(summary_invalid(
                        path,
                        format!("category '{}' has unsupported value {}", key, other),
                    ))
                }
            };
            orient_entry(Scalar::Text(key.clone()), value, path)
        })
        .collect()
}

fn parse_summary_yaml(
    text: &str,
    path: &Path,
) -> Result<Vec<(RawCategoryId, String)>, CanonlabelError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|source| CanonlabelError::YoloSummaryYamlParse {
            path: path.to_path_buf(),
            source,
        })?;

    let Some(serde_yaml::Value::Mapping(categories)) = doc.get("categories") else {
        return Err(missing_categories(path));
    };

    categories
        .iter()
        .map(|(key, value)| {
            let key = yaml_scalar(key, path)?;
            let value = yaml_scalar(value, path)?;
            orient_entry(key, value, path)
        })
        .collect()
}

fn yaml_scalar(value: &serde_yaml::Value, path: &Path) -> Result<Scalar, CanonlabelError> {
    match value {
        serde_yaml::Value::String(text) => Ok(Scalar::Text(text.clone())),
        serde_yaml::Value::Number(number) => number.as_u64().map(Scalar::Int).ok_or_else(|| {
            summary_invalid(
                path,
                format!("category id {} is not a non-negative integer", number),
            )
        }),
        other => Err(summary_invalid(
            path,
            format!("unsupported category entry {:?}", other),
        )),
    }
}

/// Accepts both `raw_id: name` and `name: raw_id` entries.
fn orient_entry(
    key: Scalar,
    value: Scalar,
    path: &Path,
) -> Result<(RawCategoryId, String), CanonlabelError> {
    match (key, value) {
        (Scalar::Int(raw), Scalar::Text(name)) | (Scalar::Text(name), Scalar::Int(raw)) => {
            Ok((RawCategoryId::new(raw), name))
        }
        (Scalar::Text(key), Scalar::Text(name)) => match key.trim().parse::<u64>() {
            Ok(raw) => Ok((RawCategoryId::new(raw), name)),
            Err(_) => Err(summary_invalid(
                path,
                format!(
                    "category entry '{}: {}' has no integer id on either side",
                    key, name
                ),
            )),
        },
        (Scalar::Int(a), Scalar::Int(b)) => Err(summary_invalid(
            path,
            format!("category entry '{}: {}' has no name", a, b),
        )),
    }
}

fn missing_categories(path: &Path) -> CanonlabelError {
    summary_invalid(path, "missing `categories` table".to_string())
}

fn summary_invalid(path: &Path, message: String) -> CanonlabelError {
    CanonlabelError::YoloSummaryInvalid {
        path: path.to_path_buf(),
        message,
    }
}

// ============================================================================
// Clip scanning
// ============================================================================

fn list_clip_dirs(split_dir: &Path) -> Result<Vec<PathBuf>, CanonlabelError> {
    let mut clips = Vec::new();
    for entry in WalkDir::new(split_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| CanonlabelError::YoloLayoutInvalid {
            path: split_dir.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;
        if entry.file_type().is_dir() {
            clips.push(entry.into_path());
        }
    }
    Ok(clips)
}

fn read_clip(
    clip: &Path,
    category_map: &RawCategoryMap,
    records: &mut Vec<AnnotationRecord>,
) -> Result<(), CanonlabelError> {
    let labels_dir = clip.join(LABELS_DIR);
    let stills_dir = clip.join(STILLS_DIR);

    let label_files = collect_files_with_extensions(&labels_dir, &[LABEL_EXTENSION])?;
    let still_files = collect_files_with_extensions(&stills_dir, &IMAGE_EXTENSIONS)?;

    if label_files.len() != still_files.len() {
        return Err(CanonlabelError::YoloClipMismatch {
            clip: clip.to_path_buf(),
            label_files: label_files.len(),
            image_files: still_files.len(),
        });
    }

    let stills = index_stills(still_files);

    let mut frames = Vec::with_capacity(label_files.len());
    for label_path in label_files {
        let frame = frame_suffix(&label_path, LABEL_PREFIX)?;
        frames.push((frame, label_path));
    }
    frames.sort_by(|(a, a_path), (b, b_path)| {
        frame_number(a)
            .cmp(&frame_number(b))
            .then_with(|| a_path.cmp(b_path))
    });

    for (frame, label_path) in frames {
        let still_path = stills
            .get(frame.as_str())
            .cloned()
            .ok_or_else(|| CanonlabelError::YoloImageNotFound {
                label_path: label_path.clone(),
                expected: stills_dir.join(format!("{STILL_PREFIX}{frame}.jpg")),
            })?;
        let (width, height) = read_image_dimensions(&still_path)?;

        let mut record = AnnotationRecord::new(ImageRef::Path(still_path.clone()), still_path);
        let content = fs::read_to_string(&label_path).map_err(CanonlabelError::Io)?;
        for (line_idx, line) in content.lines().enumerate() {
            let line_num = line_idx + 1;
            let Some(row) = parse_label_line(line, &label_path, line_num)? else {
                continue;
            };

            if xywh_extents_clamped(row.w, row.h) {
                warn!(
                    "{}:{} has negative extent ({}x{}); clamped to zero",
                    label_path.display(),
                    line_num,
                    row.w,
                    row.h
                );
            }
            let bbox_norm = yolo_to_xyxy(row.cx, row.cy, row.w, row.h);
            let bbox_px = xyxy_norm_to_abs(&bbox_norm, width, height)?;
            let label = category_map.remap(row.raw_id, || {
                format!("{}:{}", label_path.display(), line_num)
            })?;
            record.push(bbox_px, label);
        }
        records.push(record);
    }

    Ok(())
}

/// Returns the part of the file stem after `prefix`, e.g. `17` for `labels_17.txt`.
fn frame_suffix(path: &Path, prefix: &str) -> Result<String, CanonlabelError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix(prefix))
        .map(str::to_string)
        .ok_or_else(|| CanonlabelError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: format!("file stem does not start with '{}'", prefix),
        })
}

fn frame_number(frame: &str) -> Option<u64> {
    frame.parse().ok()
}

/// Maps frame suffix to still path. Extensions were already matched
/// case-insensitively; when a frame has several stills the
/// `IMAGE_EXTENSIONS` order decides.
fn index_stills(still_files: Vec<PathBuf>) -> HashMap<String, PathBuf> {
    let rank = |path: &Path| {
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        IMAGE_EXTENSIONS
            .iter()
            .position(|allowed| ext.eq_ignore_ascii_case(allowed))
            .unwrap_or(IMAGE_EXTENSIONS.len())
    };

    let mut stills: HashMap<String, PathBuf> = HashMap::new();
    for path in still_files {
        let Ok(frame) = frame_suffix(&path, STILL_PREFIX) else {
            continue;
        };
        match stills.get(&frame) {
            Some(existing) if rank(existing) <= rank(&path) => {}
            _ => {
                stills.insert(frame, path);
            }
        }
    }
    stills
}

fn collect_files_with_extensions(
    dir: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, CanonlabelError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| CanonlabelError::YoloLayoutInvalid {
            path: dir.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), CanonlabelError> {
    let size =
        imagesize::size(path).map_err(|source| CanonlabelError::YoloImageDimensionRead {
            path: path.to_path_buf(),
            source,
        })?;

    let width: u32 = size
        .width
        .try_into()
        .map_err(|_| CanonlabelError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: format!("image width {} does not fit in u32", size.width),
        })?;

    let height: u32 = size
        .height
        .try_into()
        .map_err(|_| CanonlabelError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: format!("image height {} does not fit in u32", size.height),
        })?;

    Ok((width, height))
}

// ============================================================================
// Label rows
// ============================================================================

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    raw_id: RawCategoryId,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
    #[cfg_attr(not(test), allow(dead_code))]
    confidence: Option<f64>,
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, CanonlabelError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // At most 7 tokens are kept so a pathological line cannot allocate without bound.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(7).collect();
    if !(5..=6).contains(&tokens.len()) {
        return Err(CanonlabelError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "expected 5 or 6 fields (raw_id x_center y_center width height [confidence]), found {}",
                if tokens.len() > 6 { "more than 6".to_string() } else { tokens.len().to_string() }
            ),
        });
    }

    let raw_id = tokens[0]
        .parse::<u64>()
        .map_err(|_| CanonlabelError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "invalid category id '{}'; expected non-negative integer",
                tokens[0]
            ),
        })?;

    let cx = parse_f64_token(tokens[1], "x_center", file_path, line_num)?;
    let cy = parse_f64_token(tokens[2], "y_center", file_path, line_num)?;
    let w = parse_f64_token(tokens[3], "width", file_path, line_num)?;
    let h = parse_f64_token(tokens[4], "height", file_path, line_num)?;
    // Confidence is informational only.
    let confidence = tokens
        .get(5)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|value| value.is_finite());

    Ok(Some(YoloLabelRow {
        raw_id: RawCategoryId::new(raw_id),
        cx,
        cy,
        w,
        h,
        confidence,
    }))
}

/// Fuzz-only entrypoint for YOLO single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), CanonlabelError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}

/// Counts the rows of a label file's text, failing on the first malformed one.
#[doc(hidden)]
pub fn parse_label_text(text: &str) -> Result<usize, CanonlabelError> {
    let mut rows = 0;
    for (line_idx, line) in text.lines().enumerate() {
        if parse_label_line(line, Path::new("<memory>"), line_idx + 1)?.is_some() {
            rows += 1;
        }
    }
    Ok(rows)
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, CanonlabelError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CanonlabelError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("invalid {field_name} '{raw}'; expected finite floating-point number"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_label_line_accepts_optional_confidence() {
        let parsed = parse_label_line("2 0.5 0.25 0.3 0.1", Path::new("a.txt"), 1)
            .expect("parse should succeed")
            .expect("line should produce a row");
        assert_eq!(parsed.raw_id, RawCategoryId(2));
        assert_eq!(parsed.confidence, None);

        let parsed = parse_label_line("2 0.5 0.25 0.3 0.1 0.87", Path::new("a.txt"), 1)
            .expect("parse should succeed")
            .expect("line should produce a row");
        assert_eq!(
            parsed,
            YoloLabelRow {
                raw_id: RawCategoryId(2),
                cx: 0.5,
                cy: 0.25,
                w: 0.3,
                h: 0.1,
                confidence: Some(0.87),
            }
        );
    }

    #[test]
    fn parse_label_line_ignores_unparsable_confidence() {
        for confidence in ["high", "nan", "inf"] {
            let line = format!("2 0.5 0.25 0.3 0.1 {confidence}");
            let parsed = parse_label_line(&line, Path::new("a.txt"), 1)
                .expect("parse should succeed")
                .expect("line should produce a row");
            assert_eq!(parsed.confidence, None, "{line}");
            assert_eq!(parsed.w, 0.3);
        }
    }

    #[test]
    fn parse_label_line_rejects_non_finite_geometry() {
        for line in ["0 nan 0.5 0.1 0.1", "0 0.5 inf 0.1 0.1", "0 0.5 0.5 -inf 0.1"] {
            let err = parse_label_line(line, Path::new("a.txt"), 6).unwrap_err();
            assert!(
                matches!(err, CanonlabelError::YoloLabelParse { line: 6, .. }),
                "{line}: {err:?}"
            );
        }
    }

    #[test]
    fn index_stills_matches_extensions_case_insensitively() {
        let stills = index_stills(vec![
            PathBuf::from("det_stills/stills_1.PNG"),
            PathBuf::from("det_stills/stills_2.png"),
            PathBuf::from("det_stills/stills_2.JPG"),
            PathBuf::from("det_stills/thumb_3.jpg"),
        ]);
        assert_eq!(stills.len(), 2);
        assert_eq!(stills["1"], PathBuf::from("det_stills/stills_1.PNG"));
        assert_eq!(stills["2"], PathBuf::from("det_stills/stills_2.JPG"));
    }

    #[test]
    fn parse_label_line_skips_blank_rows() {
        let parsed = parse_label_line("   ", Path::new("a.txt"), 2).expect("parse should succeed");
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_label_line_rejects_bad_field_counts() {
        let err = parse_label_line("0 0.1 0.2", Path::new("a.txt"), 3).unwrap_err();
        assert!(matches!(err, CanonlabelError::YoloLabelParse { line: 3, .. }));

        let err =
            parse_label_line("0 0.1 0.2 0.3 0.4 0.5 0.6", Path::new("a.txt"), 4).unwrap_err();
        assert!(matches!(err, CanonlabelError::YoloLabelParse { line: 4, .. }));
    }

    #[test]
    fn parse_label_line_rejects_non_integer_ids() {
        let err = parse_label_line("1.5 0.1 0.2 0.3 0.4", Path::new("a.txt"), 1).unwrap_err();
        assert!(err.to_string().contains("category id"));
    }

    #[test]
    fn toml_summary_accepts_name_to_id_tables() {
        let text = "[categories]\ncar = 3\nperson = 0\n";
        let entries = parse_summary_toml(text, Path::new("summary.toml")).expect("parse toml");
        assert_eq!(
            entries,
            vec![
                (RawCategoryId(3), "car".to_string()),
                (RawCategoryId(0), "person".to_string()),
            ]
        );
    }

    #[test]
    fn toml_summary_accepts_id_to_name_tables() {
        let text = "[categories]\n7 = \"truck\"\n2 = \"bus\"\n";
        let entries = parse_summary_toml(text, Path::new("summary.toml")).expect("parse toml");
        assert_eq!(
            entries,
            vec![
                (RawCategoryId(7), "truck".to_string()),
                (RawCategoryId(2), "bus".to_string()),
            ]
        );
    }

    #[test]
    fn yaml_summary_keeps_file_order() {
        let text = "categories:\n  5: zebra\n  1: ant\n";
        let entries = parse_summary_yaml(text, Path::new("summary.yaml")).expect("parse yaml");
        assert_eq!(
            entries,
            vec![
                (RawCategoryId(5), "zebra".to_string()),
                (RawCategoryId(1), "ant".to_string()),
            ]
        );
    }

    #[test]
    fn summary_without_categories_is_rejected() {
        let err = parse_summary_toml("title = 'x'\n", Path::new("summary.toml")).unwrap_err();
        assert!(matches!(err, CanonlabelError::YoloSummaryInvalid { .. }));
    }

    #[test]
    fn frame_suffix_strips_prefix() {
        let frame = frame_suffix(Path::new("clip/det_labels/labels_0042.txt"), LABEL_PREFIX)
            .expect("frame suffix");
        assert_eq!(frame, "0042");

        let err = frame_suffix(Path::new("clip/det_labels/frame_1.txt"), LABEL_PREFIX).unwrap_err();
        assert!(matches!(err, CanonlabelError::YoloLayoutInvalid { .. }));
    }

    #[test]
    fn missing_split_dir_is_a_layout_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join(SUMMARY_TOML), "[categories]\ncar = 0\n")
            .expect("write summary");
        let err = YoloSource::open(temp.path(), Split::Val).unwrap_err();
        assert!(matches!(err, CanonlabelError::YoloLayoutInvalid { .. }));
    }
}
