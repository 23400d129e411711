use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::Local;
use colored::*;
use serde::Serialize;
use walkdir::WalkDir;

use super::load;
use datashare::core::paths::DataPaths;
use datashare::search::vectordb::{IndexStats, IndexStore};

#[derive(Serialize)]
struct CatalogStatus {
    timestamp: String,
    data_dir: String,
    files: BTreeMap<String, bool>,
    posts: usize,
    users: usize,
    comments: usize,
    likes: usize,
    department_distribution: BTreeMap<String, usize>,
    extension_distribution: BTreeMap<String, usize>,
    uploads: UploadsSummary,
    index: Option<IndexSummary>,
    warnings: Vec<Warning>,
}

#[derive(Serialize)]
struct UploadsSummary {
    path: String,
    files: usize,
    total_bytes: u64,
}

#[derive(Serialize)]
struct IndexSummary {
    #[serde(flatten)]
    stats: IndexStats,
    stale: bool,
}

#[derive(Serialize)]
struct Warning {
    target: String,
    warning_type: String,
    message: String,
}

pub fn run(paths: &DataPaths, json: bool, strict: bool) -> Result<()> {
    let (config, catalog) = load(paths)?;
    let uploads_dir = paths.uploads(&config.uploads_dir);

    let files = paths
        .data_files()
        .into_iter()
        .map(|(path, label)| (label.to_string(), path.exists()))
        .collect();

    let mut department_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut extension_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut warnings = Vec::new();

    for post in catalog.posts() {
        let department = catalog
            .user_by_name(&post.author)
            .map(|u| u.department.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        *department_distribution.entry(department).or_insert(0) += 1;

        if let Some(ext) = post.file_extension() {
            *extension_distribution.entry(ext).or_insert(0) += 1;
        }
        if let Some(file) = &post.filename {
            if !uploads_dir.join(file).exists() {
                warnings.push(Warning {
                    target: post.title.clone(),
                    warning_type: "missing_file".to_string(),
                    message: format!("attached file '{}' is not in the uploads directory", file),
                });
            }
        }
        if catalog.user_by_name(&post.author).is_none() {
            warnings.push(Warning {
                target: post.title.clone(),
                warning_type: "unknown_author".to_string(),
                message: format!("author '{}' has no user record", post.author),
            });
        }
    }

    let index = if paths.index_db.exists() {
        let stats = IndexStore::open(&paths.index_db)?.get_stats()?;
        let stale = stats.fingerprint.as_deref() != Some(catalog.fingerprint().as_str());
        if stale {
            warnings.push(Warning {
                target: "index.db".to_string(),
                warning_type: "stale_index".to_string(),
                message: "posts changed since the index was built".to_string(),
            });
        }
        Some(IndexSummary { stats, stale })
    } else {
        None
    };

    let status = CatalogStatus {
        timestamp: Local::now().to_rfc3339(),
        data_dir: paths.root.display().to_string(),
        files,
        posts: catalog.posts().len(),
        users: catalog.users().count(),
        comments: catalog.comments().len(),
        likes: catalog.like_count(),
        department_distribution,
        extension_distribution,
        uploads: summarize_uploads(&uploads_dir),
        index,
        warnings,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    if strict && !status.warnings.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn summarize_uploads(dir: &Path) -> UploadsSummary {
    let (files, total_bytes) = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(n, bytes), e| {
            (n + 1, bytes + e.metadata().map(|m| m.len()).unwrap_or(0))
        });

    UploadsSummary {
        path: dir.display().to_string(),
        files,
        total_bytes,
    }
}

fn print_status(status: &CatalogStatus) {
    println!("{}", "Catalog Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("Checked: {}", status.timestamp);
    println!("Data:    {}", status.data_dir);
    println!();

    println!("{}", "Files".cyan());
    println!("{}", "-".repeat(30));
    for (label, exists) in &status.files {
        let mark = if *exists { "✓".green() } else { "-".dimmed() };
        println!("   {} {}", mark, label);
    }
    println!();

    println!("{}", "Counts".cyan());
    println!("{}", "-".repeat(30));
    println!("   {:<12} {:>6}", "Posts", status.posts);
    println!("   {:<12} {:>6}", "Users", status.users);
    println!("   {:<12} {:>6}", "Comments", status.comments);
    println!("   {:<12} {:>6}", "Likes", status.likes);
    println!();

    print_distribution("Posts by department", &status.department_distribution, status.posts);
    print_distribution("Posts by file type", &status.extension_distribution, status.posts);

    println!("{}", "Uploads".cyan());
    println!("{}", "-".repeat(30));
    println!(
        "   {} files, {:.2} MB in {}",
        status.uploads.files,
        status.uploads.total_bytes as f64 / (1024.0 * 1024.0),
        status.uploads.path
    );
    println!();

    println!("{}", "Similarity index".cyan());
    println!("{}", "-".repeat(30));
    match &status.index {
        Some(index) => println!(
            "   {} posts projected{}",
            index.stats.post_count,
            if index.stale { " (stale)".yellow().to_string() } else { String::new() }
        ),
        None => println!("   not built"),
    }

    if !status.warnings.is_empty() {
        println!();
        println!("{}", "⚠️  Needs attention".yellow());
        println!("{}", "-".repeat(30));
        for w in &status.warnings {
            println!("   {}: {}", w.target, w.message);
        }
    }

    println!();
    println!("{}", "=".repeat(50));
}

fn print_distribution(title: &str, dist: &BTreeMap<String, usize>, total: usize) {
    if dist.is_empty() {
        return;
    }
    println!("{}", title.cyan());
    println!("{}", "-".repeat(30));
    for (key, count) in dist {
        let pct = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("   {:<12} {:>4} ({:.0}%)", key, count, pct);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_uploads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"1234").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.txt"), b"12").unwrap();

        let summary = summarize_uploads(dir.path());
        assert_eq!(summary.files, 2);
        assert_eq!(summary.total_bytes, 6);
    }

    #[test]
    fn test_missing_uploads_dir() {
        let summary = summarize_uploads(Path::new("/tmp/datashare-no-such-uploads"));
        assert_eq!(summary.files, 0);
        assert_eq!(summary.total_bytes, 0);
    }
}
