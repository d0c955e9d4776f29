//! Pipe-table rendering and per-page markdown assembly

use crate::pdf::RawTable;
use crate::types::TableBlock;

fn cell(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn pipe_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Render a raw grid as a table block; the first row is the header
///
/// An empty grid yields `None`.
pub fn render_table(raw: &RawTable) -> Option<TableBlock> {
    let (first, rest) = raw.split_first()?;
    let header: Vec<String> = first.iter().map(cell).collect();
    let rows: Vec<Vec<String>> = rest
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(pipe_row(&header));
    lines.push(pipe_row(&vec![":--".to_string(); header.len()]));
    lines.extend(rows.iter().map(|row| pipe_row(row)));

    Some(TableBlock {
        title: None,
        markdown: lines.join("\n"),
        header,
        rows,
    })
}

/// Paragraphs separated by blank lines, then one `### Table N` section per table
pub fn combine_markdown(paragraphs: &[String], tables: &[TableBlock]) -> String {
    let text = paragraphs
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut parts = Vec::with_capacity(tables.len() + 1);
    if !text.is_empty() {
        parts.push(text);
    }
    for (i, table) in tables.iter().enumerate() {
        parts.push(format!("### Table {}\n{}", i + 1, table.markdown));
    }
    parts.join("\n\n")
}
