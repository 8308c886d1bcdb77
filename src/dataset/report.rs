//! Per-class instance counts, rendered as a compact text table.

use serde::Serialize;
use std::fmt;

/// Pairs of (category, count) columns per table row.
const PAIRS_PER_ROW: usize = 5;

/// Instance counts for a detection dataset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InstanceCountReport {
    /// Dataset split name shown in the heading.
    pub split: String,
    /// Number of images in the dataset.
    pub images: usize,
    /// Class names, indexed by label.
    pub classes: Vec<String>,
    /// Annotation count per class, parallel to `classes`.
    pub counts: Vec<usize>,
    /// Images without any annotation.
    pub background: usize,
    /// Annotations whose label has no class name.
    pub out_of_range: usize,
}

impl InstanceCountReport {
    /// Total number of annotations counted against a class.
    pub fn total_instances(&self) -> usize {
        self.counts.iter().sum()
    }

    fn table_rows(&self) -> Vec<Vec<String>> {
        let mut pairs: Vec<(String, String)> = self
            .classes
            .iter()
            .zip(&self.counts)
            .enumerate()
            .map(|(idx, (name, count))| (format!("{idx} [{name}]"), count.to_string()))
            .collect();
        pairs.push(("-1 background".to_string(), self.background.to_string()));

        // A zero background count is dropped when it would sit in a short last row.
        if self.background == 0 && pairs.len() % PAIRS_PER_ROW != 0 {
            pairs.pop();
        }

        let header: Vec<String> = (0..PAIRS_PER_ROW)
            .flat_map(|_| ["category".to_string(), "count".to_string()])
            .collect();

        let mut rows = vec![header];
        for chunk in pairs.chunks(PAIRS_PER_ROW) {
            rows.push(
                chunk
                    .iter()
                    .flat_map(|(name, count)| [name.clone(), count.clone()])
                    .collect(),
            );
        }
        rows
    }
}

impl fmt::Display for InstanceCountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} dataset with number of images {}, and instance counts:",
            self.split, self.images
        )?;

        if self.classes.is_empty() {
            return writeln!(f, "Category names are not provided.");
        }

        write!(f, "{}", render_ascii_table(&self.table_rows()))?;

        if self.out_of_range > 0 {
            writeln!(
                f,
                "{} annotation(s) have labels without a category name",
                self.out_of_range
            )?;
        }

        Ok(())
    }
}

/// Renders rows as a bordered table with the first row as header.
///
/// Short rows are padded with empty cells.
fn render_ascii_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (col, cell) in row.iter().enumerate() {
            widths[col] = widths[col].max(cell.chars().count());
        }
    }

    let border: String = widths.iter().fold(String::from("+"), |mut line, w| {
        line.push_str(&"-".repeat(w + 2));
        line.push('+');
        line
    });

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    for (idx, row) in rows.iter().enumerate() {
        out.push('|');
        for (col, width) in widths.iter().enumerate() {
            let cell = row.get(col).map(String::as_str).unwrap_or("");
            out.push_str(&format!(" {cell:<width$} |"));
        }
        out.push('\n');
        if idx == 0 {
            out.push_str(&border);
            out.push('\n');
        }
    }
    out.push_str(&border);
    out.push('\n');
    out
}
