use anyhow::Result;
use colored::*;
use serde::Serialize;

use super::{load, open_engine};
use datashare::core::model::PostId;
use datashare::core::paths::DataPaths;

#[derive(Serialize)]
struct NeighborOutput<'a> {
    id: PostId,
    title: &'a str,
    keywords: &'a [String],
    distance: f64,
}

pub fn run(paths: &DataPaths, title: &str, n_closest: Option<usize>, json: bool) -> Result<()> {
    let (config, catalog) = load(paths)?;
    let mut engine = open_engine(paths, &config)?;
    let n = n_closest.unwrap_or(config.similarity.n_closest);

    if !json {
        println!("{} Computing keyword similarity...", "→".dimmed());
    }
    let neighbors = engine.closest(&catalog, title, n)?;

    if json {
        let output: Vec<NeighborOutput> = neighbors
            .iter()
            .map(|nb| NeighborOutput {
                id: nb.post.id,
                title: &nb.post.title,
                keywords: &nb.post.keywords,
                distance: nb.distance,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("{}", "Closest Posts".bold());
    println!("{}", "=".repeat(60));
    println!("Source: {}", title.cyan());
    println!();

    if neighbors.is_empty() {
        println!("{}", "No neighbors (corpus too small or n below 2).".yellow());
        return Ok(());
    }

    for (rank, nb) in neighbors.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            nb.post.title.cyan(),
            format!("(distance {:.3})", nb.distance).dimmed()
        );
        if !nb.post.keywords.is_empty() {
            println!("   {}", nb.post.joined_keywords().green());
        }
    }

    Ok(())
}
