//! Evaluation Result Table

use serde::Serialize;

use crate::logic::dataset::FEATURE_SHORT_NAMES;
use crate::logic::evaluation::EvaluationReport;

/// Display-ready rows: 14 features to two decimals, then Actual, Predicted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub matched: usize,
    pub total: usize,
}

impl ResultTable {
    pub fn from_report(report: &EvaluationReport) -> Self {
        let headers = FEATURE_SHORT_NAMES
            .iter()
            .map(|name| name.to_string())
            .chain(["Actual".to_string(), "Predicted".to_string()])
            .collect();

        let rows = report
            .rows
            .iter()
            .map(|row| {
                row.features
                    .iter()
                    .map(|value| format!("{:.2}", value))
                    .chain([row.actual.to_string(), row.predicted().to_string()])
                    .collect()
            })
            .collect();

        Self {
            headers,
            rows,
            matched: report.matched,
            total: report.rows.len(),
        }
    }

    pub fn match_line(&self) -> String {
        format!("{} of {} predictions matched", self.matched, self.total)
    }

    /// Column-aligned plain text, header first
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(String::len).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let format_line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:>width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
        };

        let mut out = format_line(&self.headers);
        for row in &self.rows {
            out.push('\n');
            out.push_str(&format_line(row));
        }
        out
    }
}
