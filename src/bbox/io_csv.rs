//! Headerless CSV box lists, one box per row.

use std::io::Read;

use ndarray::Array2;

use crate::error::DetbridgeError;

/// Reads boxes from headerless CSV.
///
/// Every row must have the same number of fields. No rows yields an
/// empty (0, 4) array.
pub fn read_boxes_csv<R: Read>(reader: R) -> Result<Array2<f64>, DetbridgeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut values = Vec::new();
    let mut cols = None;
    let mut rows = 0;

    for result in csv_reader.deserialize::<Vec<f64>>() {
        let row = result.map_err(|e| DetbridgeError::BoxesCsvParse {
            message: e.to_string(),
        })?;
        cols.get_or_insert(row.len());
        values.extend(row);
        rows += 1;
    }

    let cols = cols.unwrap_or(4);
    Array2::from_shape_vec((rows, cols), values).map_err(|e| DetbridgeError::BoxesCsvParse {
        message: e.to_string(),
    })
}

/// Reads boxes from a CSV string.
pub fn from_boxes_csv_str(csv_str: &str) -> Result<Array2<f64>, DetbridgeError> {
    read_boxes_csv(csv_str.as_bytes())
}

/// Writes boxes as headerless CSV.
pub fn to_boxes_csv_string(boxes: &Array2<f64>) -> Result<String, DetbridgeError> {
    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    for row in boxes.rows() {
        csv_writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| DetbridgeError::BoxesCsvParse {
                message: e.to_string(),
            })?;
    }

    let bytes = csv_writer
        .into_inner()
        .map_err(|e| DetbridgeError::Io(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| DetbridgeError::BoxesCsvParse {
        message: format!("Invalid UTF-8 in output: {}", e),
    })
}

/// Fuzz-only entrypoint: parse CSV boxes and normalize them with the
/// shape heuristic.
#[cfg(feature = "fuzzing")]
pub fn fuzz_convert_boxes_csv(data: &[u8], shape: super::ImageShape) -> Result<(), DetbridgeError> {
    let boxes = read_boxes_csv(data)?;
    let _ = super::convert_to_pascal_format(boxes.view(), &super::FormatDescriptor::empty(), shape)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reads_rows() {
        let boxes = from_boxes_csv_str("10, 10, 20, 20\n0.5,0.5,0.2,0.2\n").unwrap();
        assert_eq!(boxes, array![[10.0, 10.0, 20.0, 20.0], [0.5, 0.5, 0.2, 0.2]]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(from_boxes_csv_str("").unwrap().dim(), (0, 4));
    }

    #[test]
    fn test_rejects_bad_rows() {
        assert!(matches!(
            from_boxes_csv_str("1,2,3,4\n1,2,3\n"),
            Err(DetbridgeError::BoxesCsvParse { .. })
        ));
        assert!(matches!(
            from_boxes_csv_str("1,2,x,4\n"),
            Err(DetbridgeError::BoxesCsvParse { .. })
        ));
    }

    #[test]
    fn test_writes_rows() {
        let csv = to_boxes_csv_string(&array![[1.0, 2.5, 3.0, 4.0]]).unwrap();
        assert_eq!(csv, "1,2.5,3,4\n");
    }
}
