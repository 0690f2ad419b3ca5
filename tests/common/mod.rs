#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use serde_json::{json, Value};

pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
    .save(path)
    .expect("write png file");
}

/// Writes `root/annotations/instances_<split>2017.json`.
pub fn write_coco_index(root: &Path, split: &str, index: &Value) -> PathBuf {
    let path = root
        .join("annotations")
        .join(format!("instances_{split}2017.json"));
    fs::create_dir_all(path.parent().expect("annotation dir")).expect("create annotations dir");
    fs::write(&path, serde_json::to_vec_pretty(index).expect("serialize index"))
        .expect("write coco index");
    path
}

/// Two 100x100 train images, only `a.png` present on disk.
///
/// `a.png` carries `[0, 0, 10, 10]` of raw category 7 ("cat") and
/// `[50, 20, 30, 40]` of raw category 3 ("dog").
pub fn coco_fixture(root: &Path) {
    write_png(&root.join("train2017").join("a.png"), 100, 100);
    write_coco_index(
        root,
        "train",
        &json!({
            "images": [
                {"id": 1, "file_name": "a.png", "width": 100, "height": 100},
                {"id": 2, "file_name": "missing.png", "width": 100, "height": 100}
            ],
            "annotations": [
                {"id": 10, "image_id": 1, "category_id": 7, "bbox": [0, 0, 10, 10]},
                {"id": 11, "image_id": 1, "category_id": 3, "bbox": [50, 20, 30, 40]},
                {"id": 12, "image_id": 2, "category_id": 7, "bbox": [1, 1, 2, 2]}
            ],
            "categories": [
                {"id": 7, "name": "cat"},
                {"id": 3, "name": "dog"}
            ]
        }),
    );
}

pub fn write_summary_toml(root: &Path, categories: &[(u64, &str)]) {
    let mut text = String::from("[categories]\n");
    for (raw, name) in categories {
        text.push_str(&format!("{raw} = \"{name}\"\n"));
    }
    fs::create_dir_all(root).expect("create root");
    fs::write(root.join("summary.toml"), text).expect("write summary.toml");
}

/// Writes `labels_<frame>.txt` and, if `with_still`, a matching
/// `stills_<frame>.png` of `width` x `height`.
pub fn write_frame(
    clip: &Path,
    frame: &str,
    rows: &[&str],
    with_still: bool,
    width: u32,
    height: u32,
) {
    let labels_dir = clip.join("det_labels");
    fs::create_dir_all(&labels_dir).expect("create labels dir");
    let mut text = rows.join("\n");
    text.push('\n');
    fs::write(labels_dir.join(format!("labels_{frame}.txt")), text).expect("write label file");
    if with_still {
        write_png(
            &clip.join("det_stills").join(format!("stills_{frame}.png")),
            width,
            height,
        );
    }
}

/// Raw ids 5 ("car") and 9 ("person"); clip `a` has frames 2 and 10,
/// clip `b` has frame 1. Every still is 200x100.
pub fn yolo_fixture(root: &Path) {
    write_summary_toml(root, &[(5, "car"), (9, "person")]);
    let split = root.join("train");
    write_frame(&split.join("a"), "10", &["9 0.5 0.5 0.2 0.2"], true, 200, 100);
    write_frame(
        &split.join("a"),
        "2",
        &["5 0.25 0.5 0.5 1.0", "9 0.75 0.5 0.1 0.2"],
        true,
        200,
        100,
    );
    write_frame(&split.join("b"), "1", &["5 0.5 0.5 1.0 1.0"], true, 200, 100);
}
