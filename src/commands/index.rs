//! Index command - Build the projection index for similarity queries

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{load, open_engine};
use datashare::core::paths::DataPaths;
use datashare::search::vectordb::IndexStore;

pub fn run(paths: &DataPaths, status_only: bool, rebuild: bool, json: bool) -> Result<()> {
    if status_only {
        return show_status(&paths.index_db, json);
    }

    let (config, catalog) = load(paths)?;
    let mut engine = open_engine(paths, &config)?;

    if !json {
        println!(
            "{} Embedding {} posts...",
            "→".dimmed(),
            catalog.posts().len()
        );
    }

    let start = std::time::Instant::now();
    // Without --rebuild a stored space is reused when the corpus has not changed
    let space = if rebuild {
        engine.rebuild(&catalog)
    } else {
        engine.space(&catalog)
    };
    let duration_ms = start.elapsed().as_millis();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "indexed": space.len(),
                "seed": space.seed,
                "fingerprint": catalog.fingerprint(),
                "duration_ms": duration_ms,
            })
        );
    } else {
        println!();
        println!(
            "{} Indexed {} posts in {:.2}s",
            "✓".green().bold(),
            space.len().to_string().cyan(),
            duration_ms as f64 / 1000.0
        );
        println!("  {} Seed: {}", "→".dimmed(), space.seed);
        println!(
            "  {} Index saved to: {}",
            "→".dimmed(),
            paths.index_db.display()
        );
    }

    Ok(())
}

/// Show index status
fn show_status(db_path: &Path, json: bool) -> Result<()> {
    if !db_path.exists() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "exists": false,
                    "error": "Index not found"
                })
            );
        } else {
            println!(
                "{} Index not found. Run {} first.",
                "!".yellow().bold(),
                "datashare index".cyan()
            );
        }
        return Ok(());
    }

    let db = IndexStore::open(db_path)?;
    let stats = db.get_stats()?;

    let file_size = std::fs::metadata(db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "post_count": stats.post_count,
                "fingerprint": stats.fingerprint,
                "seed": stats.seed,
                "built_at": stats.built_at,
                "file_size_bytes": file_size,
            })
        );
    } else {
        println!("{}", "Index Status".bold());
        println!();
        println!(
            "  {} {} posts projected",
            "→".dimmed(),
            stats.post_count.to_string().cyan()
        );
        if let Some(seed) = stats.seed {
            println!("  {} Seed: {}", "→".dimmed(), seed);
        }
        println!(
            "  {} Size: {:.2} KB",
            "→".dimmed(),
            file_size as f64 / 1024.0
        );
        if let Some(ts) = stats.built_at {
            let dt = chrono::DateTime::from_timestamp(ts, 0)
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            println!("  {} Last built: {}", "→".dimmed(), dt);
        }
    }

    Ok(())
}
