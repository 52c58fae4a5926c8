//! Permissive parser for the notebook text format.

use serde_json::Value;

use super::{
    AnomalyKind, CELL_MARKER, FORMAT_VERSION_KEY, METADATA_FENCE, ParseAnomaly, ParsedDocument,
};
use crate::document::{CURRENT_FORMAT_VERSION, CellContent, NotebookContent, Properties};

/// Parse notebook text. Never fails; problems are reported as anomalies.
pub fn parse(text: &str) -> ParsedDocument {
    let parser = Parser::new(text);
    let parsed = parser.run();
    if !parsed.anomalies.is_empty() {
        tracing::debug!("Parsed notebook with {} anomalies", parsed.anomalies.len());
    }
    parsed
}

/// A cell block being collected.
struct PendingCell<'a> {
    cell_type: String,
    properties: Properties,
    body: Vec<&'a str>,
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    anomalies: Vec<ParseAnomaly>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: split_lines(text),
            anomalies: Vec::new(),
        }
    }

    fn anomaly(&mut self, kind: AnomalyKind, index: usize, message: impl Into<String>) {
        self.anomalies.push(ParseAnomaly {
            kind,
            line: index + 1,
            message: message.into(),
        });
    }

    fn run(mut self) -> ParsedDocument {
        let mut content = NotebookContent::new();
        let start = self.read_metadata(&mut content);

        let mut orphan: Vec<&'a str> = Vec::new();
        let mut orphan_start = None;
        let mut cells: Vec<PendingCell<'a>> = Vec::new();

        for index in start..self.lines.len() {
            let line = self.lines[index];
            if line.starts_with(CELL_MARKER) {
                match parse_delimiter(line) {
                    Ok((cell_type, properties)) => {
                        cells.push(PendingCell {
                            cell_type,
                            properties,
                            body: Vec::new(),
                        });
                        continue;
                    }
                    Err(reason) => {
                        self.anomaly(
                            AnomalyKind::MalformedDelimiter,
                            index,
                            format!("malformed cell delimiter ({reason}); kept as cell content"),
                        );
                    }
                }
            }

            match cells.last_mut() {
                Some(cell) => cell.body.push(line),
                None => {
                    if orphan_start.is_none() && !line.trim().is_empty() {
                        orphan_start = Some(index);
                    }
                    orphan.push(line);
                }
            }
        }

        // Text before the first delimiter becomes a cell of the default type
        // instead of being dropped.
        if let Some(index) = orphan_start {
            let cell_type = content.default_cell_type().to_string();
            self.anomaly(
                AnomalyKind::OrphanContent,
                index,
                format!("text before the first cell delimiter; kept as a '{cell_type}' cell"),
            );
            content
                .cells
                .push(CellContent::new(cell_type, trim_block(&orphan)));
        }

        for cell in cells {
            let mut parsed = CellContent::new(cell.cell_type, trim_block(&cell.body));
            parsed.metadata.properties = cell.properties;
            content.cells.push(parsed);
        }

        ParsedDocument {
            content,
            anomalies: self.anomalies,
        }
    }

    /// Read the metadata block, if any. Returns the index of the first line
    /// after it.
    fn read_metadata(&mut self, content: &mut NotebookContent) -> usize {
        if self.lines.first() != Some(&METADATA_FENCE) {
            return 0;
        }

        let Some(close) = self
            .lines
            .iter()
            .skip(1)
            .position(|l| *l == METADATA_FENCE)
            .map(|p| p + 1)
        else {
            self.anomaly(
                AnomalyKind::UnterminatedMetadata,
                0,
                "metadata block has no closing '---'; treated as content",
            );
            return 0;
        };

        let body = self.lines[1..close].join("\n");
        let map = if body.trim().is_empty() {
            Ok(serde_json::Map::new())
        } else {
            serde_json::from_str::<serde_json::Map<String, Value>>(&body)
        };

        match map {
            Ok(mut map) => {
                if let Some(version) = map.remove(FORMAT_VERSION_KEY) {
                    match version.as_u64().and_then(|v| u32::try_from(v).ok()) {
                        Some(v) => content.format_version = v,
                        None => self.anomaly(
                            AnomalyKind::InvalidFormatVersion,
                            0,
                            format!(
                                "format_version {version} is not a valid version; using {CURRENT_FORMAT_VERSION}"
                            ),
                        ),
                    }
                }
                content.metadata = Properties::from(map);
                close + 1
            }
            Err(e) => {
                self.anomaly(
                    AnomalyKind::InvalidMetadata,
                    0,
                    format!("metadata block is not a JSON object ({e}); treated as content"),
                );
                0
            }
        }
    }
}

/// Split into lines, normalizing `\r\n` and ignoring the final newline.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

/// Join block lines, trimming at most one blank line at each end.
fn trim_block(lines: &[&str]) -> String {
    let mut lines = lines;
    if lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines = &lines[1..];
    }
    if lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines = &lines[..lines.len() - 1];
    }
    lines.join("\n")
}

/// Parse `# %% [type] key=value ...`.
fn parse_delimiter(line: &str) -> Result<(String, Properties), String> {
    let rest = line[CELL_MARKER.len()..].trim_start();
    let rest = rest
        .strip_prefix('[')
        .ok_or_else(|| "expected '[cell type]' after the marker".to_string())?;
    let close = rest
        .find(']')
        .ok_or_else(|| "unclosed cell type bracket".to_string())?;

    let cell_type = rest[..close].trim();
    if cell_type.is_empty() {
        return Err("empty cell type".to_string());
    }
    if cell_type.contains(char::is_whitespace) {
        return Err(format!("cell type '{cell_type}' contains whitespace"));
    }

    let properties = parse_properties(&rest[close + 1..])?;
    Ok((cell_type.to_string(), properties))
}

/// Parse whitespace-separated `key=value` pairs.
///
/// Keys are bare up to `=` or whitespace, or a JSON string literal. Values
/// that parse as JSON are stored as JSON, anything else as a string. A bare
/// `key` means `key=true`. Later duplicates win.
pub(super) fn parse_properties(input: &str) -> Result<Properties, String> {
    let mut properties = Properties::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let (key, after_key) = read_key(rest)?;
        let (value, after_value) = match after_key.strip_prefix('=') {
            Some(raw) => {
                let len = value_len(raw)?;
                (parse_value(&raw[..len]), &raw[len..])
            }
            None => (Value::Bool(true), after_key),
        };
        if key.is_empty() {
            return Err("property with an empty key".to_string());
        }
        if !after_value.is_empty() && !after_value.starts_with(char::is_whitespace) {
            return Err(format!("unexpected text after property '{key}'"));
        }
        properties.insert(key, value);
        rest = after_value.trim_start();
    }
    Ok(properties)
}

fn read_key(input: &str) -> Result<(String, &str), String> {
    if input.starts_with('"') {
        let len = string_literal_len(input)?;
        let key = serde_json::from_str::<String>(&input[..len])
            .map_err(|e| format!("invalid quoted property key ({e})"))?;
        return Ok((key, &input[len..]));
    }
    let end = input
        .find(|c: char| c == '=' || c.is_whitespace())
        .unwrap_or(input.len());
    Ok((input[..end].to_string(), &input[end..]))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Byte length of the JSON string literal opening `input`.
fn string_literal_len(input: &str) -> Result<usize, String> {
    let mut escaped = false;
    for (i, c) in input.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Ok(i + 1),
            _ => {}
        }
    }
    Err("unterminated string in properties".to_string())
}

/// Byte length of a value: up to whitespace outside JSON strings and brackets.
fn value_len(input: &str) -> Result<usize, String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            c if c.is_whitespace() && depth == 0 => return Ok(i),
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    if in_string {
        return Err("unterminated string in properties".to_string());
    }
    if depth != 0 {
        return Err("unbalanced brackets in properties".to_string());
    }
    Ok(input.len())
}
