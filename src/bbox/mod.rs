//! Bounding-box format normalization.
//!
//! Box tensors arrive in one of several encodings, named by a pair of
//! layout and unit:
//!
//! | layout | meaning |
//! |---|---|
//! | `LTWH` | left, top, width, height |
//! | `LTRB` | left, top, right, bottom |
//! | `CCWH` | center x, center y, width, height |
//!
//! with values either in `pixel` units or `fractional` (proportions of the
//! image width and height). Training expects a single encoding, LTRB in
//! pixels (the Pascal VOC convention), so everything passes through
//! [`convert_to_pascal_format`].
//!
//! All functions here are pure: they read their arguments and allocate a
//! fresh output array, so they can be called from any number of loader
//! workers at once.
//!
//! # Compatibility quirks
//!
//! Two behaviors are kept for compatibility with existing datasets rather
//! than because they are sound:
//!
//! - An entirely empty descriptor with a mean box value below 1 is read as
//!   fractional `CCWH` ([`FormatSource::MagnitudeHeuristic`]). Datasets
//!   that carry explicit metadata never hit this path.
//! - Fractional `LTRB` boxes are scaled but not clipped to the image.

mod convert;
mod format;
pub mod io_csv;
mod shape;

pub use convert::{convert_boxes, convert_to_pascal_format};
pub use format::{
    resolve_format, BoxFormat, BoxLayout, BoxUnit, FormatDescriptor, FormatSource,
    ResolvedFormat, MODE_KEY, TYPE_KEY,
};
pub use shape::ImageShape;
