//! Output formatting for the command line.

use std::sync::OnceLock;

use resgraph::{DataResponse, Frame};

static JSON_OUTPUT: OnceLock<bool> = OnceLock::new();

const MAX_COLUMN_WIDTH: usize = 48;

/// Switch all output to machine-readable JSON. First call wins.
pub fn set_json(enabled: bool) {
    let _ = JSON_OUTPUT.set(enabled);
}

pub fn is_json() -> bool {
    JSON_OUTPUT.get().copied().unwrap_or(false)
}

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Print query responses, returning the number that failed.
pub fn print_responses(responses: &[DataResponse]) -> usize {
    let failed = responses.iter().filter(|r| r.outcome.error().is_some()).count();

    if is_json() {
        let items: Vec<serde_json::Value> = responses
            .iter()
            .map(|r| match r.outcome.frame() {
                Some(frame) => serde_json::json!({ "refId": r.ref_id, "frame": frame }),
                None => serde_json::json!({ "refId": r.ref_id, "error": r.outcome.error_message() }),
            })
            .collect();
        print_json(&serde_json::json!({ "results": items }));
        return failed;
    }

    for response in responses {
        match response.outcome.frame() {
            Some(frame) => print_frame(&response.ref_id, frame),
            None => eprintln!("  [{}] error: {}", response.ref_id, response.outcome.error_message()),
        }
    }
    failed
}

fn print_frame(ref_id: &str, frame: &Frame) {
    let rows = frame.row_count();
    if rows == 0 {
        println!("  [{ref_id}] No results.");
        return;
    }
    println!("  [{ref_id}] {rows} results:\n");

    let cells: Vec<Vec<String>> = (0..rows)
        .map(|i| {
            frame
                .fields
                .iter()
                .map(|f| f.values.get(i).map(|v| truncate(&v.to_string())).unwrap_or_default())
                .collect()
        })
        .collect();
    let widths: Vec<usize> = frame
        .fields
        .iter()
        .enumerate()
        .map(|(col, field)| {
            cells
                .iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(field.name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    for (field, width) in frame.fields.iter().zip(&widths) {
        print!("  {:<width$}", field.name);
    }
    println!();
    for width in &widths {
        print!("  {}", "-".repeat(*width));
    }
    println!();
    for row in &cells {
        for (cell, width) in row.iter().zip(&widths) {
            print!("  {cell:<width$}");
        }
        println!();
    }

    if let Some(link) = frame.fields.first().and_then(|f| f.links().first()) {
        println!("\n  {}: {}", link.title, link.url);
    }
}

fn truncate(cell: &str) -> String {
    if cell.chars().count() <= MAX_COLUMN_WIDTH {
        return cell.to_string();
    }
    let mut out: String = cell.chars().take(MAX_COLUMN_WIDTH - 3).collect();
    out.push_str("...");
    out
}
