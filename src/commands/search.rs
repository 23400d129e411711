use anyhow::Result;
use colored::*;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::{load, truncate};
use datashare::core::model::Post;
use datashare::core::paths::DataPaths;
use datashare::core::query::{SearchFilters, SortOrder};

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    sort: SortOrder,
    total: usize,
    posts: Vec<&'a Post>,
}

pub fn run(
    paths: &DataPaths,
    query: &str,
    sort: &str,
    filters: SearchFilters,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let (_, catalog) = load(paths)?;
    let sort: SortOrder = sort.parse()?;
    let results = catalog.search(query, &filters, sort)?;

    let total = results.len();
    let display_limit = limit.unwrap_or(20);
    let shown: Vec<&Post> = results.into_iter().take(display_limit).collect();

    if json {
        let output = SearchOutput {
            query,
            sort,
            total,
            posts: shown,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let re = if query.is_empty() {
        None
    } else {
        Some(
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()?,
        )
    };

    println!("{}", "Search Results".bold());
    println!("{}", "=".repeat(60));
    if !query.is_empty() {
        println!("Query: \"{}\"", query);
    }
    println!("Sort: {:?}", sort);
    println!("Found: {} posts", total);
    println!();

    if shown.is_empty() {
        println!("{}", "No matches found.".yellow());
        return Ok(());
    }

    for post in &shown {
        println!(
            "{} {} {}",
            format!("#{}", post.id).dimmed(),
            highlight(&post.title, re.as_ref()).cyan(),
            format!("({}, {} likes)", post.date.as_deref().unwrap_or("undated"), post.likes).dimmed()
        );
        println!("  by {}", post.author);
        if let Some(re) = &re {
            if let Some(context) = match_context(post, re) {
                println!("  {}", context.dimmed());
            }
        }
        if !post.keywords.is_empty() {
            println!("  {}", post.joined_keywords().green());
        }
        if let Some(file) = &post.filename {
            println!("  file: {}", file);
        }
        println!();
    }

    if total > display_limit {
        println!(
            "{}",
            format!("... and {} more results", total - display_limit).dimmed()
        );
    }

    Ok(())
}

fn highlight(text: &str, re: Option<&Regex>) -> String {
    match re {
        Some(re) => re
            .replace_all(text, |caps: &regex::Captures| caps[0].bold().to_string())
            .into_owned(),
        None => text.to_string(),
    }
}

/// Where in the description the query matched, with surrounding text.
fn match_context(post: &Post, re: &Regex) -> Option<String> {
    let mat = re.find(&post.description)?;
    let context = extract_context(&post.description, mat.start(), mat.end(), 30);
    Some(format!("...{}...", truncate(&context.replace('\n', " "), 100)))
}

fn extract_context(
    content: &str,
    match_start: usize,
    match_end: usize,
    context_chars: usize,
) -> String {
    let chars: Vec<char> = content.chars().collect();
    let char_start = content[..match_start].chars().count();
    let char_end = content[..match_end].chars().count();

    let start = char_start.saturating_sub(context_chars);
    let end = (char_end + context_chars).min(chars.len());

    chars[start..end].iter().collect()
}
