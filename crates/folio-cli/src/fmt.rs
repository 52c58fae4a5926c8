//! Fmt command: rewrite a notebook in canonical text form.

use std::fs;

use folio_core::format::{parse, serialize};

use crate::colors;
use crate::executor::LoadedNotebook;

/// Canonical text of `source`, plus how many anomalies parsing it produced.
pub fn canonical(source: &str) -> (String, usize) {
    let parsed = parse(source);
    (serialize(&parsed.content), parsed.anomalies.len())
}

pub fn execute(notebook_path: &str, check: bool, force: bool) -> anyhow::Result<()> {
    let notebook = LoadedNotebook::load(notebook_path)?;
    let (formatted, anomalies) = canonical(&notebook.source);

    if anomalies > 0 && !force {
        anyhow::bail!(
            "{} has {} parse problem(s); run `folio check` or pass --force",
            notebook.path.display(),
            anomalies
        );
    }

    if formatted == notebook.source {
        println!("{} is already formatted", notebook.path.display());
        return Ok(());
    }

    if check {
        anyhow::bail!("{} would reformat", notebook.path.display());
    }

    fs::write(&notebook.path, formatted).map_err(folio_core::Error::from)?;
    println!(
        "{}Formatted{} {}",
        colors::GREEN,
        colors::RESET,
        notebook.path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_is_idempotent() {
        let (once, anomalies) = canonical("# %% [markdown]\n\n\nHello\n# %% [json]   hidden\n{}");
        assert_eq!(anomalies, 0);
        let (twice, _) = canonical(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_counts_anomalies() {
        let (_, anomalies) = canonical("stray\n# %% [markdown]\nbody\n");
        assert_eq!(anomalies, 1);
    }
}
