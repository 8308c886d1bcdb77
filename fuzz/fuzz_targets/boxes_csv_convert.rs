//! Fuzz target for CSV box parsing and box normalization.
//!
//! The first two bytes pick the image shape; the rest is CSV.
//!
//! Run with:
//!   cargo +nightly fuzz run boxes_csv_convert

#![no_main]

use detbridge::bbox::io_csv::fuzz_convert_boxes_csv;
use detbridge::bbox::ImageShape;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 || data.len() > 1024 * 1024 {
        return;
    }

    let shape = ImageShape::new(usize::from(data[0]) + 1, usize::from(data[1]) + 1);
    let _ = fuzz_convert_boxes_csv(&data[2..], shape);
});
