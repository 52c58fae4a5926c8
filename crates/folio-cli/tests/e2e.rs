//! End-to-end tests for Folio CLI commands.
//!
//! These tests run the `folio` binary against real notebook files.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory holding one notebook file.
struct TestNotebook {
    temp_dir: TempDir,
    notebook_path: PathBuf,
}

impl TestNotebook {
    fn new(filename: &str, source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let notebook_path = temp_dir.path().join(filename);
        fs::write(&notebook_path, source).expect("Failed to write notebook");

        Self {
            temp_dir,
            notebook_path,
        }
    }

    fn path(&self) -> &str {
        self.notebook_path.to_str().unwrap()
    }

    fn ipynb_path(&self) -> PathBuf {
        self.notebook_path.with_extension("ipynb")
    }

    fn read(&self) -> String {
        fs::read_to_string(&self.notebook_path).expect("Failed to read notebook")
    }
}

fn folio() -> Command {
    Command::cargo_bin("folio").expect("Failed to find folio binary")
}

/// Variables defined by a json cell, used by the cells after it.
fn greeting_notebook() -> String {
    r#"---
{
  "title": "Greeting"
}
---
# %% [json]
{"name": "Ada", "count": 3}

# %% [markdown]
Hello {{name}}, you have {{count}} messages.

# %% [html]
<b>{{name}}</b>

"#
    .to_string()
}

/// The second cell fails.
fn failing_notebook() -> String {
    r#"# %% [markdown]
first

# %% [json]
[1, 2, 3]

# %% [markdown]
third

"#
    .to_string()
}

// =============================================================================
// folio check
// =============================================================================

#[test]
fn test_check_nonexistent_notebook() {
    folio()
        .args(["check", "/nonexistent/notebook.folio"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Notebook not found"));
}

#[test]
fn test_check_clean_notebook() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());

    folio()
        .args(["check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 cells"))
        .stdout(predicate::str::contains("No problems found"));
}

#[test]
fn test_check_reports_anomalies() {
    let notebook = TestNotebook::new("broken.folio", "stray text\n# %% [markdown]\nbody\n");

    folio()
        .args(["check", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("line 1"))
        .stderr(predicate::str::contains("1 problem(s) found"));
}

#[test]
fn test_check_warns_about_unknown_cell_types() {
    let notebook = TestNotebook::new("custom.folio", "# %% [sql]\nselect 1\n");

    folio()
        .args(["check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("no handler for cell type 'sql'"));
}

// =============================================================================
// folio fmt
// =============================================================================

#[test]
fn test_fmt_rewrites_to_canonical_form() {
    let notebook = TestNotebook::new(
        "tight.folio",
        "# %% [markdown]\nA\n# %% [json] run_on_load\n{}\n",
    );

    folio()
        .args(["fmt", "--check", notebook.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("would reformat"));

    folio()
        .args(["fmt", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Formatted"));
    assert_eq!(
        notebook.read(),
        "# %% [markdown]\nA\n\n# %% [json] run_on_load=true\n{}\n\n"
    );

    folio()
        .args(["fmt", "--check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("already formatted"));
}

#[test]
fn test_fmt_refuses_notebook_with_anomalies() {
    let source = "stray text\n# %% [markdown]\nbody\n";
    let notebook = TestNotebook::new("broken.folio", source);

    folio()
        .args(["fmt", notebook.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(notebook.read(), source);

    folio()
        .args(["fmt", "--force", notebook.path()])
        .assert()
        .success();
    assert!(notebook.read().contains("stray text"));
}

// =============================================================================
// folio run
// =============================================================================

#[test]
fn test_run_nonexistent_notebook() {
    folio()
        .args(["run", "/nonexistent/notebook.folio"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found").or(predicate::str::contains("Notebook")));
}

#[test]
fn test_run_shares_namespace_between_cells() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());

    folio()
        .args(["run", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello Ada, you have 3 messages."))
        .stdout(predicate::str::contains("<b>Ada</b>"))
        .stdout(predicate::str::contains("Completed"));
}

#[test]
fn test_run_halts_after_failure() {
    let notebook = TestNotebook::new("failing.folio", &failing_notebook());

    folio()
        .args(["run", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("first"))
        .stdout(predicate::str::contains("not run: an earlier cell failed"))
        .stdout(predicate::str::contains("third").not())
        .stderr(predicate::str::contains("1 of 3 cells failed"));
}

#[test]
fn test_run_continue_on_error() {
    let notebook = TestNotebook::new("failing.folio", &failing_notebook());

    folio()
        .args(["run", "--continue-on-error", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("third"))
        .stdout(predicate::str::contains("expected a JSON object"));
}

#[test]
fn test_run_single_cell() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());

    folio()
        .args(["run", "--cell", "1", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Ada\""))
        .stdout(predicate::str::contains("Hello Ada").not())
        .stdout(predicate::str::contains("Completed"));
}

#[test]
fn test_run_cell_out_of_range() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());

    folio()
        .args(["run", "--cell", "9", notebook.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_run_unknown_cell_type() {
    let notebook = TestNotebook::new("custom.folio", "# %% [sql]\nselect 1\n");

    folio()
        .args(["run", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("no handler registered for cell type 'sql'"));
}

// =============================================================================
// folio export
// =============================================================================

#[test]
fn test_export_writes_ipynb() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());

    folio()
        .args(["export", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported"));

    let ipynb = fs::read_to_string(notebook.ipynb_path()).expect("ipynb not written");
    let json: serde_json::Value = serde_json::from_str(&ipynb).unwrap();
    assert_eq!(json["nbformat"], 4);
    assert_eq!(json["metadata"]["folio"]["source_file"], "greeting.folio");

    let cells = json["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[0]["cell_type"], "code");
    assert_eq!(cells[1]["cell_type"], "markdown");
    assert_eq!(cells[2]["metadata"]["folio"]["state"], "done");
}

#[test]
fn test_export_without_running() {
    let notebook = TestNotebook::new("greeting.folio", &greeting_notebook());
    let output = notebook.temp_dir.path().join("out.ipynb");

    folio()
        .args([
            "export",
            "--no-run",
            "--no-outputs",
            "-o",
            output.to_str().unwrap(),
            notebook.path(),
        ])
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let cells = json["cells"].as_array().unwrap();
    assert_eq!(cells[0]["metadata"]["folio"]["state"], "idle");
    assert!(cells[0]["outputs"].as_array().unwrap().is_empty());
    assert!(!notebook.ipynb_path().exists());
}

// =============================================================================
// folio new
// =============================================================================

#[test]
fn test_new_creates_runnable_notebook() {
    let temp_dir = TempDir::new().unwrap();

    folio()
        .current_dir(temp_dir.path())
        .args(["new", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created new notebook"));

    let path = temp_dir.path().join("demo.folio");
    let source = fs::read_to_string(&path).unwrap();
    assert!(source.contains("\"title\": \"demo\""));
    assert!(source.contains("# %% [json] run_on_load=true"));

    folio()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("<p>Hello from Folio!</p>"));

    folio()
        .current_dir(temp_dir.path())
        .args(["new", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
