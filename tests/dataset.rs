use std::sync::{Arc, Mutex};

use canonlabel::dataset::{
    images_per_class, AxisOrder, BalancePolicy, BoxTargets, DetectionDataset, ImageArray,
};
use canonlabel::diagnostics::{GridFileVisualizer, VisualPanel, Visualizer, PANEL_SIZE};
use canonlabel::ir::io_coco_json::CocoSource;
use canonlabel::ir::io_yolo::YoloSource;
use canonlabel::ir::{AnnotationSource, BBoxXYXY, ClassIndex, Normalized, Pixel, Split};
use canonlabel::CanonlabelError;

mod common;

#[derive(Default)]
struct RecordingVisualizer {
    calls: Mutex<Vec<Vec<(u32, u32, usize)>>>,
}

impl Visualizer for RecordingVisualizer {
    fn show(&self, panels: &[VisualPanel]) -> Result<(), CanonlabelError> {
        let shapes = panels
            .iter()
            .map(|p| (p.image.width(), p.image.height(), p.overlays.len()))
            .collect();
        self.calls.lock().expect("lock").push(shapes);
        Ok(())
    }
}

fn flip_horizontal(
    image: ImageArray,
    boxes: Vec<BBoxXYXY<Pixel>>,
    labels: Vec<ClassIndex>,
) -> Result<(ImageArray, Vec<BBoxXYXY<Pixel>>, Vec<ClassIndex>), CanonlabelError> {
    let width = image.width() as f64;
    let order = image.order();
    let mut data = image.into_data();
    data.invert_axis(ndarray::Axis(order.width_axis()));
    let boxes = boxes
        .iter()
        .map(|b| BBoxXYXY::from_xyxy(width - b.xmax(), b.ymin(), width - b.xmin(), b.ymax()))
        .collect();
    Ok((ImageArray::new(data, order), boxes, labels))
}

#[test]
fn transform_output_flows_into_normalization() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let dataset = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .transform(flip_horizontal)
        .build();

    let sample = dataset.get(0).expect("get sample");
    assert!(sample.targets.boxes[0].approx_eq(&BBoxXYXY::from_xyxy(0.9, 0.0, 1.0, 0.1), 1e-12));

    // The stored record is untouched.
    let record = dataset.record(0).expect("record");
    assert_eq!(record.boxes()[0].to_array(), [0.0, 0.0, 10.0, 10.0]);
}

#[test]
fn resize_to_chw_uses_output_dimensions() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::yolo_fixture(temp.path());

    let dataset = DetectionDataset::builder(YoloSource::open(temp.path(), Split::Train).expect("open"))
        .transform(|image: ImageArray, boxes: Vec<BBoxXYXY<Pixel>>, labels| {
            // Keep the top-left 100x50 quarter and halve every box.
            let cropped = image
                .data()
                .slice(ndarray::s![..50, ..100, ..])
                .to_owned();
            let boxes = boxes
                .iter()
                .map(|b| BBoxXYXY::from_xyxy(b.xmin() / 2.0, b.ymin() / 2.0, b.xmax() / 2.0, b.ymax() / 2.0))
                .collect();
            Ok((
                ImageArray::new(cropped, AxisOrder::Hwc).into_order(AxisOrder::Chw),
                boxes,
                labels,
            ))
        })
        .build();

    let sample = dataset.get(0).expect("get sample");
    assert_eq!(sample.image.data().shape(), &[3, 50, 100]);
    assert!(sample.targets.boxes[0].approx_eq(&BBoxXYXY::from_xyxy(0.0, 0.0, 0.5, 1.0), 1e-9));
}

#[test]
fn failing_transform_propagates() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let dataset = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .transform(|_, _, _| Err(CanonlabelError::Transform("crop left no pixels".to_string())))
        .build();
    assert!(matches!(dataset.get(0), Err(CanonlabelError::Transform(_))));
}

#[test]
fn balancing_caps_every_class_at_the_minimum() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_summary_toml(temp.path(), &[(0, "car"), (1, "person")]);
    let clip = temp.path().join("train").join("clip");
    for (frame, row) in [
        ("1", "0 0.5 0.5 0.1 0.1"),
        ("2", "0 0.5 0.5 0.1 0.1"),
        ("3", "1 0.5 0.5 0.1 0.1"),
        ("4", "0 0.5 0.5 0.1 0.1"),
        ("5", "1 0.5 0.5 0.1 0.1"),
    ] {
        common::write_frame(&clip, frame, &[row], true, 8, 8);
    }

    let unbalanced = DetectionDataset::new(YoloSource::open(temp.path(), Split::Train).expect("open"));
    assert_eq!(unbalanced.len(), 5);
    assert_eq!(unbalanced.min_images_per_class(), None);

    let balanced = DetectionDataset::builder(YoloSource::open(temp.path(), Split::Train).expect("open"))
        .balance(BalancePolicy::KeepEarliest)
        .build();
    assert_eq!(balanced.min_images_per_class(), Some(2));
    assert_eq!(balanced.len(), 4);

    let kept: Vec<_> = balanced.records().cloned().collect();
    let per_class = images_per_class(&kept, balanced.catalog().len());
    assert_eq!(per_class, vec![0, 2, 2]);

    let text = balanced.summary().to_string();
    assert!(text.contains("Number of Images: 4"));
    assert!(text.contains("Minimum Number of Images for a Class: 2"));
    assert!(text.contains("\tcar: 2"));
}

#[test]
fn seeded_balancing_is_reproducible() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::yolo_fixture(temp.path());

    let open = || YoloSource::open(temp.path(), Split::Train).expect("open");
    let a = DetectionDataset::builder(open())
        .balance(BalancePolicy::Shuffled { seed: 3 })
        .build();
    let b = DetectionDataset::builder(open())
        .balance(BalancePolicy::Shuffled { seed: 3 })
        .build();

    let paths = |d: &DetectionDataset<YoloSource>| {
        d.records()
            .map(|r| r.image_path().to_path_buf())
            .collect::<Vec<_>>()
    };
    assert_eq!(paths(&a), paths(&b));
}

#[test]
fn visualizer_sees_three_panels_and_changes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let plain = DetectionDataset::new(CocoSource::open(temp.path(), Split::Train).expect("open"));
    let recorder = Arc::new(RecordingVisualizer::default());
    let observed = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .visualizer(recorder.clone())
        .build();

    assert_eq!(plain.get(0).expect("plain"), observed.get(0).expect("observed"));

    let calls = recorder.calls.lock().expect("lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        vec![(PANEL_SIZE, PANEL_SIZE, 2), (100, 100, 0), (100, 100, 2)]
    );
}

#[test]
fn get_image_skips_diagnostics() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let recorder = Arc::new(RecordingVisualizer::default());
    let dataset = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .visualizer(recorder.clone())
        .build();

    let image = dataset.get_image(0).expect("image");
    assert_eq!((image.width(), image.height(), image.channels()), (100, 100, 3));
    assert!(recorder.calls.lock().expect("lock").is_empty());
}

#[test]
fn grid_visualizer_writes_one_file_per_access() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let grids = Arc::new(GridFileVisualizer::new(temp.path().join("viz")).expect("viz"));
    let dataset = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .visualizer(grids.clone())
        .build();
    dataset.get(0).expect("first");
    dataset.get_pixel(0).expect("second");

    assert_eq!(grids.written(), 2);
    assert!(grids.dir().join("sample_000001.png").is_file());
}

#[test]
fn encoder_sees_normalized_targets() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::coco_fixture(temp.path());

    let dataset = DetectionDataset::builder(CocoSource::open(temp.path(), Split::Train).expect("open"))
        .target_encoder(|targets: BoxTargets<Normalized>| {
            if targets.boxes.iter().all(BBoxXYXY::within_unit) {
                Ok(targets.boxes.iter().map(BBoxXYXY::area).sum::<f64>())
            } else {
                Err(CanonlabelError::TargetEncoding("box outside unit square".to_string()))
            }
        })
        .build();

    let sample = dataset.get(0).expect("get sample");
    assert!((sample.targets - (0.01 + 0.3 * 0.4)).abs() < 1e-12);
}

#[test]
fn class_statistics_follow_retained_records() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::yolo_fixture(temp.path());

    let dataset = DetectionDataset::new(YoloSource::open(temp.path(), Split::Train).expect("open"));
    assert_eq!(dataset.class_counts(), &[0, 2, 2]);
    assert_eq!(dataset.summary().class_counts[2], ("person".to_string(), 2));
    assert_eq!(dataset.source().records().len(), dataset.len());
}

#[test]
fn dataset_can_be_shared_across_threads() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::yolo_fixture(temp.path());

    let dataset = Arc::new(DetectionDataset::new(
        YoloSource::open(temp.path(), Split::Train).expect("open"),
    ));
    let handles: Vec<_> = (0..dataset.len())
        .map(|i| {
            let dataset = Arc::clone(&dataset);
            std::thread::spawn(move || dataset.get(i).map(|s| s.targets.labels.len()))
        })
        .collect();
    let counts: Vec<usize> = handles
        .into_iter()
        .map(|h| h.join().expect("join").expect("get"))
        .collect();
    assert_eq!(counts, vec![2, 1, 1]);
}
