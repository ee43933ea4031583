use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::Value;

use crate::warehouse::Row;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Vertical,
    Ndjson,
}

/// Render sample rows. `truncate` caps cell width in the table and vertical
/// formats (0 disables it); NDJSON is never truncated.
pub fn render_rows(rows: &[Row], format: OutputFormat, truncate: usize) -> Result<String> {
    if rows.is_empty() {
        return Ok(String::new());
    }

    match format {
        OutputFormat::Table => Ok(render_table(rows, truncate)),
        OutputFormat::Vertical => Ok(render_vertical(rows, truncate)),
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row)?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

fn render_table(rows: &[Row], truncate: usize) -> String {
    let mut table = Table::new();
    let columns: Vec<&String> = rows[0].keys().collect();

    let header: Vec<Cell> = columns.iter().map(|c| Cell::new(c)).collect();
    table.set_header(header);

    for row in rows {
        let cells: Vec<Cell> = columns
            .iter()
            .map(|column| {
                let value = row.get(column.as_str()).unwrap_or(&Value::Null);
                Cell::new(truncate_value(format_value(value), truncate))
            })
            .collect();
        table.add_row(cells);
    }

    format!("{table}\n")
}

fn render_vertical(rows: &[Row], truncate: usize) -> String {
    let mut out = String::new();

    for (idx, row) in rows.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "*************************** {} ***************************",
            idx + 1
        );
        for (name, value) in row {
            let _ = writeln!(
                out,
                "{:>20}: {}",
                name,
                truncate_value(format_value(value), truncate)
            );
        }
    }

    out
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_value(value: String, truncate: usize) -> String {
    if truncate > 0 && value.chars().count() > truncate {
        let head: String = value.chars().take(truncate).collect();
        format!("{head}...")
    } else {
        value
    }
}
