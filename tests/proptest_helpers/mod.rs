#![allow(dead_code)]

use canonlabel::ir::{AnnotationRecord, BBoxXYXY, ClassIndex, ImageId, ImageRef, Pixel};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Relative tolerance for pixel -> unit -> pixel round trips, scaled by image size.
pub const EPS_ROUNDTRIP: f64 = 1e-9;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_image_size() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=8192, 1u32..=8192)
}

/// An ordered pixel box lying inside a `width` x `height` image.
pub fn arb_bbox_within(width: u32, height: u32) -> BoxedStrategy<BBoxXYXY<Pixel>> {
    let (w, h) = (f64::from(width), f64::from(height));
    (0.0..=w, 0.0..=w, 0.0..=h, 0.0..=h)
        .prop_map(|(x0, x1, y0, y1)| {
            BBoxXYXY::from_xyxy(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
        })
        .boxed()
}

/// Records whose labels are drawn from `1..num_classes`; some have no boxes.
pub fn arb_records(
    num_classes: usize,
    max_records: usize,
    max_boxes: usize,
) -> BoxedStrategy<Vec<AnnotationRecord>> {
    prop::collection::vec(
        prop::collection::vec(1..num_classes, 0..=max_boxes),
        0..=max_records,
    )
    .prop_map(|label_sets| {
        label_sets
            .into_iter()
            .enumerate()
            .map(|(i, labels)| {
                let mut record =
                    AnnotationRecord::new(ImageRef::Id(ImageId::new(i as u64)), format!("{i}.png"));
                for label in labels {
                    record.push(BBoxXYXY::from_xyxy(0.0, 0.0, 1.0, 1.0), ClassIndex::new(label));
                }
                record
            })
            .collect()
    })
    .boxed()
}
