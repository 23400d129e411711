use std::path::Path;

use anyhow::{Context, Result};
use colored::*;

use datashare::core::paths::DataPaths;
use datashare::core::storage::{renumber_catalog, renumber_posts};

/// Reassign Post IDs as 1..N in row order. Safe to run repeatedly.
///
/// On the data directory's own posts file, comments and like records
/// follow their posts to the new ids. A `--file` elsewhere is renumbered
/// on its own.
pub fn run(paths: &DataPaths, file: Option<&Path>, json: bool) -> Result<()> {
    let path = file.unwrap_or(&paths.posts);
    let (renumbering, dropped) = if path == paths.posts.as_path() {
        renumber_catalog(paths)
    } else {
        renumber_posts(path).map(|r| (r, 0))
    }
    .with_context(|| format!("Failed to renumber {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "file": path.display().to_string(),
                "renumbered": renumbering.rows,
                "changed_ids": renumbering.ids.iter().filter(|(old, new)| old != new).count(),
                "dropped_records": dropped,
            })
        );
    } else {
        println!(
            "{} Renumbered {} posts in {}",
            "✓".green().bold(),
            renumbering.rows.to_string().cyan(),
            path.display()
        );
        if dropped > 0 {
            println!(
                "{} Dropped {} comment/like records for posts that no longer exist",
                "!".yellow().bold(),
                dropped
            );
        }
    }

    Ok(())
}
