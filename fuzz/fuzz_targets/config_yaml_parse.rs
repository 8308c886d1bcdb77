//! Fuzz target for training config parsing and planning.
//!
//! Run with:
//!   cargo +nightly fuzz run config_yaml_parse

#![no_main]

use detbridge::config::TrainConfig;
use detbridge::train::{TrainOptions, TrainPlan};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(cfg) = TrainConfig::from_yaml_str(text) {
        let opts = TrainOptions {
            validate: true,
            ..Default::default()
        };
        let _ = TrainPlan::from_config(&cfg, &opts);
    }
});
