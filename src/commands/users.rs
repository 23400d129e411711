use anyhow::Result;
use colored::*;

use super::load;
use datashare::core::model::User;
use datashare::core::paths::DataPaths;

pub fn run(paths: &DataPaths, query: &str, json: bool) -> Result<()> {
    let (_, catalog) = load(paths)?;
    let users: Vec<&User> = if query.is_empty() {
        catalog.users().collect()
    } else {
        catalog.search_users(query)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    println!("{}", "Users".bold());
    println!("{}", "=".repeat(60));
    println!("Found: {} users", users.len());
    println!();

    if users.is_empty() {
        println!("{}", "No matching users.".yellow());
        return Ok(());
    }

    for user in users {
        let posts = catalog.posts().iter().filter(|p| p.author == user.name).count();
        println!(
            "{} {} {}",
            format!("#{}", user.id).dimmed(),
            user.name.cyan(),
            format!("<{}>", user.email).dimmed()
        );
        if !user.job_title.is_empty() || !user.department.is_empty() {
            println!("  {} / {}", user.job_title, user.department);
        }
        if !user.research_interests.is_empty() {
            println!("  interests: {}", user.research_interests);
        }
        println!(
            "  {} posts, {} followers, {} following",
            posts,
            user.followers.len(),
            user.following.len()
        );
        println!();
    }

    Ok(())
}
