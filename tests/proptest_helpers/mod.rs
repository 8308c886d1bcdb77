#![allow(dead_code)]

use detbridge::bbox::ImageShape;
use ndarray::Array2;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const EPS: f64 = 1e-9;

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

pub fn arb_shape() -> BoxedStrategy<ImageShape> {
    (1usize..=4096, 1usize..=4096)
        .prop_map(|(h, w)| ImageShape::new(h, w))
        .boxed()
}

/// An (N, 4) array of arbitrary finite values in `range`.
pub fn arb_boxes(max_rows: usize, range: std::ops::Range<f64>) -> BoxedStrategy<Array2<f64>> {
    (0usize..=max_rows)
        .prop_flat_map(move |rows| {
            proptest::collection::vec(range.clone(), rows * 4).prop_map(move |values| {
                Array2::from_shape_vec((rows, 4), values).expect("rows * 4 values")
            })
        })
        .boxed()
}

/// A shape with degenerate LTWH boxes whose origin lies inside the image.
pub fn arb_degenerate_ltwh(max_rows: usize) -> BoxedStrategy<(ImageShape, Array2<f64>)> {
    arb_shape()
        .prop_flat_map(move |shape| {
            let row = (
                0..shape.width,
                0..shape.height,
                prop_oneof![Just(0.0), 0.0..1.0],
                prop_oneof![Just(0.0), 0.0..1.0],
            );
            proptest::collection::vec(row, 1..=max_rows).prop_map(move |rows| {
                let values: Vec<f64> = rows
                    .iter()
                    .flat_map(|&(x, y, w, h)| [x as f64, y as f64, w, h])
                    .collect();
                let boxes = Array2::from_shape_vec((rows.len(), 4), values)
                    .expect("rows * 4 values");
                (shape, boxes)
            })
        })
        .boxed()
}

pub fn assert_close(a: &Array2<f64>, b: &Array2<f64>, eps: f64) -> Result<(), String> {
    if a.dim() != b.dim() {
        return Err(format!("shape mismatch: left={:?} right={:?}", a.dim(), b.dim()));
    }
    for ((idx, l), r) in a.indexed_iter().zip(b.iter()) {
        if (l - r).abs() > eps {
            return Err(format!("value mismatch at {:?}: left={} right={} eps={}", idx, l, r, eps));
        }
    }
    Ok(())
}
