//! Built-in cell handlers installed by the CLI.
//!
//! None of these evaluate a language: `markdown` and `html` pass their content
//! through with `{{name}}` placeholders filled from the namespace, and `json`
//! publishes the keys of an object as namespace variables.

use folio_core::handler::{CellSnapshot, EditorKind, HandlerRegistry, HandlerResult, SyncHandler};
use folio_core::output::CellOutput;
use folio_core::runtime::RuntimeNamespace;
use serde_json::Value;

pub const MARKDOWN: &str = "markdown";
pub const HTML: &str = "html";
pub const JSON: &str = "json";

/// Register the built-in handlers, replacing any already registered.
pub fn install(registry: &HandlerRegistry) {
    registry.register(
        MARKDOWN,
        SyncHandler::new(run_markdown).with_editor(EditorKind::RichText),
    );
    registry.register(HTML, SyncHandler::new(run_html));
    registry.register(JSON, SyncHandler::new(run_json));
    tracing::debug!("Installed built-in handlers: {}", registry.cell_types().join(", "));
}

fn run_markdown(cell: &CellSnapshot, namespace: &mut RuntimeNamespace) -> HandlerResult {
    Ok(CellOutput::text(interpolate(&cell.content, namespace)))
}

fn run_html(cell: &CellSnapshot, namespace: &mut RuntimeNamespace) -> HandlerResult {
    Ok(CellOutput::html(interpolate(&cell.content, namespace)))
}

fn run_json(cell: &CellSnapshot, namespace: &mut RuntimeNamespace) -> HandlerResult {
    let value: Value = if cell.content.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&cell.content)?
    };

    let Value::Object(object) = &value else {
        return Err(format!("expected a JSON object, found {}", kind_of(&value)).into());
    };
    for (name, field) in object {
        namespace.set(name.clone(), field.clone());
    }

    Ok(CellOutput::json(value))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Replace `{{name}}` with the namespace variable `name`.
///
/// Unknown names stay in the text as written and are reported on the console.
fn interpolate(template: &str, namespace: &mut RuntimeNamespace) -> String {
    let mut out = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let placeholder = &rest[start..start + 2 + len + 2];
        let name = rest[start + 2..start + 2 + len].trim();

        out.push_str(&rest[..start]);
        match namespace.get(name) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push_str(placeholder);
                missing.push(name.to_string());
            }
        }
        rest = &rest[start + placeholder.len()..];
    }
    out.push_str(rest);

    for name in missing {
        namespace
            .console()
            .warn(format!("undefined variable '{}'", name));
    }
    out
}
