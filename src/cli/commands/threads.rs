//! Stored thread and post commands.

use console::style;

use matome::pipeline::Pipeline;
use matome::scrape::ScrapedPost;
use matome::storage::StoredPost;

use crate::cli::helpers::truncate;

/// List stored threads.
pub fn cmd_threads(pipeline: &Pipeline, board: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let threads = pipeline.threads().list(board, limit)?;

    if threads.is_empty() {
        println!(
            "{} No threads stored. Run 'matome collect' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Threads").bold());
    println!("{}", "-".repeat(80));
    println!(
        "{:>5}  {:>6}  {:<14} {:<16} Title",
        "ID", "Posts", "Board", "Last seen"
    );
    println!("{}", "-".repeat(80));
    for thread in threads {
        let hydrated = if thread.posts_fetched_at.is_some() {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{:>5}  {:>6}  {:<14} {:<16} {}{}",
            thread.id,
            thread.post_count,
            truncate(&thread.board, 14),
            thread.last_seen_at.format("%Y-%m-%d %H:%M"),
            hydrated,
            truncate(&thread.title, 40)
        );
    }

    Ok(())
}

/// Show posts for a thread given by stored ID or URL.
///
/// Unknown URLs are extracted directly without storing anything.
pub async fn cmd_posts(
    pipeline: &Pipeline,
    thread: &str,
    refresh: bool,
    json: bool,
) -> anyhow::Result<()> {
    let stored = match thread.parse::<i64>() {
        Ok(id) => pipeline.threads().get(id)?,
        Err(_) => pipeline.threads().get_by_url(thread)?,
    };

    let posts: Vec<ScrapedPost> = match stored {
        Some(ref stored) => pipeline
            .hydrate_posts(stored, refresh)
            .await?
            .into_iter()
            .map(into_scraped)
            .collect(),
        None if thread.contains("://") => pipeline.scraper().extract_posts(thread).await,
        None => {
            println!("{} Thread '{}' not found", style("✗").red(), thread);
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    if let Some(ref stored) = stored {
        println!("\n{}", style(&stored.title).bold());
        println!("{}", style(&stored.url).dim());
    }
    if posts.is_empty() {
        println!("{} No posts could be extracted", style("!").yellow());
        return Ok(());
    }

    for post in &posts {
        let id = post
            .anonymized_id
            .as_deref()
            .map(|id| format!(" ID:{}", id))
            .unwrap_or_default();
        println!(
            "\n{} {} {}{}",
            style(post.sequence_number).cyan(),
            style(&post.author).green(),
            post.posted_at.format("%Y/%m/%d %H:%M:%S"),
            style(id).dim()
        );
        for line in post.content.lines() {
            println!("  {}", line);
        }
    }

    Ok(())
}

fn into_scraped(post: StoredPost) -> ScrapedPost {
    ScrapedPost {
        sequence_number: post.post_number,
        author: post.author,
        content: post.content,
        posted_at: post.posted_at,
        anonymized_id: post.anonymized_id,
        raw_date_text: post.raw_date_text,
    }
}
