use std::path::Path;

use anyhow::{Context, Result};
use colored::*;

use super::{load, open_engine};
use datashare::core::paths::DataPaths;

/// Write the keyword graph for `title` to `output`, or to stdout.
pub fn run(
    paths: &DataPaths,
    title: &str,
    n_closest: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let (config, catalog) = load(paths)?;
    let mut engine = open_engine(paths, &config)?;
    let n = n_closest.unwrap_or(config.similarity.n_closest);

    let html = engine.graph(&catalog, title, n, &config.graph)?;

    match output {
        Some(path) => {
            std::fs::write(path, &html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} Graph for {} written to {}",
                "✓".green().bold(),
                title.cyan(),
                path.display()
            );
        }
        None => print!("{}", html),
    }

    Ok(())
}
