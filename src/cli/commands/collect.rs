//! Collection command.

use chrono::Utc;
use console::style;

use matome::pipeline::{CollectionOverrides, Pipeline};

use crate::cli::helpers::{cancel_on_ctrl_c, truncate};

/// Collect threads from the target boards and store them.
pub async fn cmd_collect(
    pipeline: &Pipeline,
    overrides: &CollectionOverrides,
    if_due: bool,
    with_posts: bool,
) -> anyhow::Result<()> {
    if if_due && !pipeline.is_collection_due(Utc::now())? {
        println!(
            "{} Collection not due yet (see 'matome settings show')",
            style("→").dim()
        );
        return Ok(());
    }

    let cancel = cancel_on_ctrl_c();
    let outcome = pipeline.run_collection(overrides, &cancel).await?;
    let report = &outcome.report;

    for board in &report.boards_failed {
        println!("{} {} could not be listed", style("✗").red(), board);
    }

    if outcome.nothing_collected() {
        println!(
            "{} Nothing collected from {} board(s)",
            style("!").yellow(),
            report.boards_succeeded.len() + report.boards_failed.len()
        );
        return Ok(());
    }

    println!(
        "\n{} ({} new)",
        style(format!("Collected {} threads", report.threads.len())).bold(),
        outcome.new_threads
    );
    println!("{}", "-".repeat(72));
    println!("{:>6}  {:<14} Title", "Posts", "Board");
    println!("{}", "-".repeat(72));
    for thread in &report.threads {
        println!(
            "{:>6}  {:<14} {}",
            thread.post_count,
            truncate(&thread.board, 14),
            truncate(&thread.title, 48)
        );
    }

    if report.cancelled {
        println!("{} Run was interrupted; results are partial", style("!").yellow());
        return Ok(());
    }

    if with_posts {
        for scraped in &report.threads {
            if cancel.is_cancelled() {
                break;
            }
            let Some(thread) = pipeline.threads().get_by_url(&scraped.url)? else {
                continue;
            };
            let posts = pipeline.hydrate_posts(&thread, false).await?;
            println!(
                "  {} {} posts  {}",
                style("✓").green(),
                posts.len(),
                truncate(&thread.title, 48)
            );
        }
    }

    Ok(())
}
