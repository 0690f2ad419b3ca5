//! Fuzz target for COCO annotation index parsing.
//!
//! Feeds arbitrary bytes to the index parser and category remapping,
//! checking for panics, crashes, or hangs.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_json_parse

#![no_main]

use std::path::Path;

use canonlabel::ir::io_coco_json::CocoSource;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    // file_names that are absolute or contain `..` are rejected before any
    // lookup, so existence checks never leave this (missing) directory.
    let _ = CocoSource::from_coco_slice(data, Path::new("/nonexistent/canonlabel-fuzz"));
});
