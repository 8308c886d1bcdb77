//! Box encodings and the metadata that names them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::DetbridgeError;

/// Descriptor key naming the box layout.
pub const MODE_KEY: &str = "mode";
/// Descriptor key naming the coordinate unit.
pub const TYPE_KEY: &str = "type";

/// The order and meaning of the four numbers in a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxLayout {
    /// Left, top, width, height (COCO style).
    #[serde(rename = "LTWH")]
    Ltwh,
    /// Left, top, right, bottom (Pascal VOC style).
    #[serde(rename = "LTRB")]
    Ltrb,
    /// Center x, center y, width, height (YOLO style).
    #[serde(rename = "CCWH")]
    Ccwh,
}

impl BoxLayout {
    /// Returns the wire name of the layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxLayout::Ltwh => "LTWH",
            BoxLayout::Ltrb => "LTRB",
            BoxLayout::Ccwh => "CCWH",
        }
    }
}

impl fmt::Display for BoxLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether box values are absolute pixels or fractions of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxUnit {
    Pixel,
    Fractional,
}

impl BoxUnit {
    /// Returns the wire name of the unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxUnit::Pixel => "pixel",
            BoxUnit::Fractional => "fractional",
        }
    }
}

impl fmt::Display for BoxUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (layout, unit) pair. Every combination is a valid encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxFormat {
    pub layout: BoxLayout,
    pub unit: BoxUnit,
}

impl BoxFormat {
    /// The canonical output encoding: corners in pixel units.
    pub const PASCAL_PIXEL: BoxFormat = BoxFormat::new(BoxLayout::Ltrb, BoxUnit::Pixel);

    /// Encoding assumed for any key the descriptor leaves out.
    pub const DEFAULT: BoxFormat = BoxFormat::new(BoxLayout::Ltwh, BoxUnit::Pixel);

    pub const fn new(layout: BoxLayout, unit: BoxUnit) -> Self {
        Self { layout, unit }
    }

    /// Parses a pair of wire names, failing on anything unrecognized.
    pub fn parse(mode: &str, unit: &str) -> Result<Self, DetbridgeError> {
        let unsupported = || DetbridgeError::UnsupportedBoxFormat {
            mode: mode.to_string(),
            unit: unit.to_string(),
        };
        let layout = mode.parse::<BoxLayout>().map_err(|_| unsupported())?;
        let unit = unit.parse::<BoxUnit>().map_err(|_| unsupported())?;
        Ok(Self::new(layout, unit))
    }
}

impl fmt::Display for BoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layout, self.unit)
    }
}

impl FromStr for BoxLayout {
    type Err = DetbridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LTWH" => Ok(BoxLayout::Ltwh),
            "LTRB" => Ok(BoxLayout::Ltrb),
            "CCWH" => Ok(BoxLayout::Ccwh),
            other => Err(DetbridgeError::UnsupportedBoxFormat {
                mode: other.to_string(),
                unit: String::new(),
            }),
        }
    }
}

impl FromStr for BoxUnit {
    type Err = DetbridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pixel" => Ok(BoxUnit::Pixel),
            "fractional" => Ok(BoxUnit::Fractional),
            other => Err(DetbridgeError::UnsupportedBoxFormat {
                mode: String::new(),
                unit: other.to_string(),
            }),
        }
    }
}

/// Coordinate metadata attached to a box tensor (its `info.coords`).
///
/// Only the `mode` and `type` keys are interpreted, but the whole mapping
/// matters: a descriptor carrying any key at all is never treated as
/// empty by [`resolve_format`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatDescriptor {
    coords: BTreeMap<String, String>,
}

impl FormatDescriptor {
    /// Creates a descriptor with no metadata at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a descriptor stating both layout and unit.
    pub fn explicit(format: BoxFormat) -> Self {
        Self::empty()
            .with_mode(format.layout.as_str())
            .with_type(format.unit.as_str())
    }

    /// Sets the `mode` key.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.coords.insert(MODE_KEY.to_string(), mode.into());
        self
    }

    /// Sets the `type` key.
    pub fn with_type(mut self, unit: impl Into<String>) -> Self {
        self.coords.insert(TYPE_KEY.to_string(), unit.into());
        self
    }

    /// Sets an arbitrary key.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.coords.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.coords.get(key).map(String::as_str)
    }

    pub fn mode(&self) -> Option<&str> {
        self.get(MODE_KEY)
    }

    pub fn unit(&self) -> Option<&str> {
        self.get(TYPE_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormatDescriptor {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            coords: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How a [`BoxFormat`] was arrived at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatSource {
    /// Both `mode` and `type` were present.
    Explicit,
    /// At least one key was missing and took its default.
    Defaulted,
    /// The descriptor was empty and small box values were read as
    /// fractional centers. A compatibility quirk, not a reliable signal.
    MagnitudeHeuristic,
}

/// A resolved box encoding together with its provenance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub format: BoxFormat,
    pub source: FormatSource,
}

/// Determines the encoding of `boxes` from its descriptor.
///
/// Missing keys default to `LTWH` and `pixel`. Only when the descriptor is
/// entirely empty and the mean box value is below 1 does the magnitude
/// heuristic switch to fractional `CCWH`.
pub fn resolve_format(
    boxes: ArrayView2<'_, f64>,
    descriptor: &FormatDescriptor,
) -> Result<ResolvedFormat, DetbridgeError> {
    if descriptor.is_empty() {
        if let Some(mean) = boxes.mean().filter(|mean| *mean < 1.0) {
            tracing::debug!(
                mean,
                rows = boxes.nrows(),
                "box descriptor is empty and values are small, reading boxes as CCWH/fractional"
            );
            return Ok(ResolvedFormat {
                format: BoxFormat::new(BoxLayout::Ccwh, BoxUnit::Fractional),
                source: FormatSource::MagnitudeHeuristic,
            });
        }
    }

    let mode = descriptor.mode().unwrap_or(BoxFormat::DEFAULT.layout.as_str());
    let unit = descriptor.unit().unwrap_or(BoxFormat::DEFAULT.unit.as_str());
    let format = BoxFormat::parse(mode, unit)?;

    let source = if descriptor.mode().is_some() && descriptor.unit().is_some() {
        FormatSource::Explicit
    } else {
        FormatSource::Defaulted
    };

    Ok(ResolvedFormat { format, source })
}
