//! Conversion of any supported box encoding to Pascal VOC pixel corners.

use ndarray::{arr1, stack, Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::format::{resolve_format, BoxFormat, BoxLayout, BoxUnit, FormatDescriptor};
use super::shape::ImageShape;
use crate::error::DetbridgeError;

/// Converts an (N, 4) box array to LTRB pixel coordinates.
///
/// The encoding comes from `descriptor` (see
/// [`resolve_format`](super::resolve_format)); `shape` supplies the image
/// width and height used for scaling and clipping.
///
/// # Errors
/// Fails with [`DetbridgeError::InvalidBoundingBoxShape`] when the array does
/// not have exactly four columns, and with
/// [`DetbridgeError::UnsupportedBoxFormat`] when the descriptor names an
/// unknown layout or unit.
///
/// # Example
///
/// ```
/// use detbridge::bbox::{convert_to_pascal_format, FormatDescriptor, ImageShape};
/// use ndarray::array;
///
/// let boxes = array![[10.0, 10.0, 20.0, 20.0]];
/// let descriptor = FormatDescriptor::empty().with_mode("LTWH").with_type("pixel");
/// let pascal = convert_to_pascal_format(boxes.view(), &descriptor, ImageShape::new(100, 100))?;
/// assert_eq!(pascal, array![[10.0, 10.0, 30.0, 30.0]]);
/// # Ok::<(), detbridge::DetbridgeError>(())
/// ```
pub fn convert_to_pascal_format(
    boxes: ArrayView2<'_, f64>,
    descriptor: &FormatDescriptor,
    shape: ImageShape,
) -> Result<Array2<f64>, DetbridgeError> {
    check_columns(boxes)?;
    let resolved = resolve_format(boxes, descriptor)?;
    convert_boxes(boxes, resolved.format, shape)
}

/// Converts boxes in a known encoding to LTRB pixel coordinates.
///
/// # Errors
/// Fails with [`DetbridgeError::InvalidBoundingBoxShape`] when the array does
/// not have exactly four columns.
pub fn convert_boxes(
    boxes: ArrayView2<'_, f64>,
    format: BoxFormat,
    shape: ImageShape,
) -> Result<Array2<f64>, DetbridgeError> {
    check_columns(boxes)?;
    Ok(match (format.layout, format.unit) {
        (BoxLayout::Ltwh, BoxUnit::Pixel) => ltwh_to_pascal(boxes, shape),
        (BoxLayout::Ltwh, BoxUnit::Fractional) => {
            ltwh_to_pascal(scale_to_pixels(boxes, shape).view(), shape)
        }
        (BoxLayout::Ltrb, BoxUnit::Pixel) => boxes.to_owned(),
        // No final clip here, unlike every other path. Kept for
        // compatibility with datasets that already rely on it.
        (BoxLayout::Ltrb, BoxUnit::Fractional) => scale_to_pixels(boxes, shape),
        (BoxLayout::Ccwh, BoxUnit::Pixel) => ccwh_to_pascal(boxes, shape),
        (BoxLayout::Ccwh, BoxUnit::Fractional) => {
            ccwh_to_pascal(scale_to_pixels(boxes, shape).view(), shape)
        }
    })
}

fn check_columns(boxes: ArrayView2<'_, f64>) -> Result<(), DetbridgeError> {
    if boxes.ncols() == 4 {
        Ok(())
    } else {
        Err(DetbridgeError::InvalidBoundingBoxShape {
            rows: boxes.nrows(),
            cols: boxes.ncols(),
        })
    }
}

/// Multiplies the columns by (width, height, width, height).
fn scale_to_pixels(boxes: ArrayView2<'_, f64>, shape: ImageShape) -> Array2<f64> {
    let (w, h) = (shape.width_f64(), shape.height_f64());
    let scale = arr1(&[w, h, w, h]);
    &boxes * &scale
}

fn ltwh_to_pascal(boxes: ArrayView2<'_, f64>, shape: ImageShape) -> Array2<f64> {
    let (w, h) = (shape.width_f64(), shape.height_f64());
    let x = boxes.column(0);
    let y = boxes.column(1);

    let left = x.mapv(|v| clip_lower(v, 0.0));
    let top = y.mapv(|v| clip_lower(v, 0.0));
    // Width and height are floored at one pixel so zero-sized boxes survive.
    let right = far_edge(x, boxes.column(2), w);
    let bottom = far_edge(y, boxes.column(3), h);

    stack![Axis(1), left, top, right, bottom]
}

/// `clip(start + max(extent, 1), 0, limit)`, measured from the raw start.
fn far_edge(start: ArrayView1<'_, f64>, extent: ArrayView1<'_, f64>, limit: f64) -> Array1<f64> {
    let mut edge = extent.mapv(|v| clip_lower(v, 1.0));
    edge += &start;
    edge.mapv_inplace(|v| clip(v, 0.0, limit));
    edge
}

fn ccwh_to_pascal(boxes: ArrayView2<'_, f64>, shape: ImageShape) -> Array2<f64> {
    let (w, h) = (shape.width_f64(), shape.height_f64());
    let cx = boxes.column(0);
    let cy = boxes.column(1);
    // Floor, not round: odd extents lose the half pixel.
    let half_w = boxes.column(2).mapv(|v| (v / 2.0).floor());
    let half_h = boxes.column(3).mapv(|v| (v / 2.0).floor());

    let left = (&cx - &half_w).mapv(|v| clip(v, 0.0, w));
    let top = (&cy - &half_h).mapv(|v| clip(v, 0.0, h));
    let right = (&cx + &half_w).mapv(|v| clip(v, 0.0, w));
    let bottom = (&cy + &half_h).mapv(|v| clip(v, 0.0, h));

    stack![Axis(1), left, top, right, bottom]
}

// NaN passes through both clips unchanged.
#[inline]
fn clip_lower(value: f64, min: f64) -> f64 {
    if value < min {
        min
    } else {
        value
    }
}

#[inline]
fn clip(value: f64, min: f64, max: f64) -> f64 {
    let value = clip_lower(value, min);
    if value > max {
        max
    } else {
        value
    }
}
