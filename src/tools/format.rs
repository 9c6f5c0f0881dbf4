//! Output formatting utilities for tools.
//!
//! Query results handed back to the agent are rendered as ASCII tables, the
//! way a SQL command-line client prints them.

use crate::models::QueryResult;
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.name.width()).collect();
    for index in 0..result.row_count() {
        for (i, value) in result.row_values(index).into_iter().enumerate() {
            widths[i] = widths[i].max(format_value(value).width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad_center(&col.name, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for index in 0..result.row_count() {
        let row_str: String = result
            .row_values(index)
            .into_iter()
            .zip(&widths)
            .map(|(value, w)| {
                let formatted = format_value(value);
                if matches!(value, JsonValue::Number(_)) {
                    format!("| {} ", pad_left(&formatted, *w))
                } else {
                    format!("| {} ", pad_right(&formatted, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_count = result.row_count();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)",
        row_count,
        row_text,
        result.execution_time_ms as f64 / 1000.0
    ));
    if result.truncated {
        output.push_str(&format!(
            "\nResult truncated to the first {} rows. Narrow the query with a row limit or an aggregate.",
            row_count
        ));
    }
    output.push('\n');

    output
}

// `format!` width specifiers count chars, not display columns.

fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

fn pad_center(s: &str, width: usize) -> String {
    let total = width.saturating_sub(s.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(total - left))
}
