//! Serializer for the notebook text format.
//!
//! The output is canonical: metadata keys and cell properties are sorted, and
//! parsing the output yields the same `NotebookContent`.

use serde_json::Value;

use super::{CELL_MARKER, FORMAT_VERSION_KEY, METADATA_FENCE};
use crate::document::{CURRENT_FORMAT_VERSION, CellContent, NotebookContent, Properties};

/// Serialize notebook content to text.
pub fn serialize(content: &NotebookContent) -> String {
    let mut out = String::new();

    if !content.metadata.is_empty() || content.format_version != CURRENT_FORMAT_VERSION {
        let mut map = content.metadata.clone().into_json_map();
        if content.format_version != CURRENT_FORMAT_VERSION {
            map.insert(FORMAT_VERSION_KEY.to_string(), content.format_version.into());
        }
        out.push_str(METADATA_FENCE);
        out.push('\n');
        out.push_str(&serde_json::to_string_pretty(&map).unwrap_or_default());
        out.push('\n');
        out.push_str(METADATA_FENCE);
        out.push('\n');
    }

    for cell in &content.cells {
        write_cell(&mut out, cell);
    }

    out
}

fn write_cell(out: &mut String, cell: &CellContent) {
    out.push_str(&delimiter_line(&cell.cell_type, &cell.metadata.properties));
    out.push('\n');

    // The parser drops one leading blank line, so protect a real one.
    if cell
        .content
        .split('\n')
        .next()
        .is_some_and(|first| first.trim().is_empty())
    {
        out.push('\n');
    }
    out.push_str(&cell.content);
    out.push('\n');
    // Separator, dropped again as the trailing blank line on parse.
    out.push('\n');
}

/// Build `# %% [type] key=value ...` with keys in sorted order.
pub(crate) fn delimiter_line(cell_type: &str, properties: &Properties) -> String {
    let mut line = format!("{CELL_MARKER} [{cell_type}]");
    for (key, value) in properties.iter() {
        line.push(' ');
        line.push_str(&encode_key(key));
        line.push('=');
        line.push_str(&encode_value(value));
    }
    line
}

/// Keys are bare up to `=` or whitespace; anything else is a JSON string.
fn encode_key(key: &str) -> String {
    let bare = !key.is_empty()
        && !key.starts_with('"')
        && !key.contains(|c: char| c.is_whitespace() || c == '=');
    if bare {
        key.to_string()
    } else {
        Value::from(key).to_string()
    }
}

/// Strings that read back as themselves are written bare; everything else
/// as compact JSON.
fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) if is_bare_safe(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_bare_safe(s: &str) -> bool {
    !s.is_empty()
        && !s
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '=' | '[' | ']' | '{' | '}' | '\\'))
        && serde_json::from_str::<Value>(s).is_err()
}
