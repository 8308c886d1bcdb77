//! Fuzz target for tensor store JSON parsing.
//!
//! Parsed stores are also run through tensor binding and the dataset
//! adapter, so malformed sample shapes reach the annotation code.
//!
//! Run with:
//!   cargo +nightly fuzz run store_json_parse

#![no_main]

use detbridge::dataset::{DatasetOptions, DetectionDataset, TensorBindings, TensorNames};
use detbridge::store::from_json_slice;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 10MB is generous for a fixture store.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(store) = from_json_slice(data) else {
        return;
    };
    let Ok(bindings) = TensorBindings::resolve(&store, &TensorNames::default()) else {
        return;
    };
    if let Ok(dataset) = DetectionDataset::from_store(&store, bindings, DatasetOptions::default()) {
        let _ = dataset.annotations();
        let _ = dataset.instance_counts();
    }
});
