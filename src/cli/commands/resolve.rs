//! Board server resolution command.

use console::style;

use matome::pipeline::Pipeline;
use matome::scrape::DirectoryOrigin;

/// Resolve servers for boards, or list the directory when none are given.
pub async fn cmd_resolve(pipeline: &Pipeline, boards: &[String], probe: bool) -> anyhow::Result<()> {
    let scraper = pipeline.scraper();

    if boards.is_empty() {
        let (entries, origin) = scraper.directory().entries().await;
        let origin = match origin {
            DirectoryOrigin::Source(url) => url,
            DirectoryOrigin::Fallback => "built-in table".to_string(),
            DirectoryOrigin::Empty => "nothing".to_string(),
        };
        println!(
            "\n{} {}",
            style(format!("{} boards", entries.len())).bold(),
            style(format!("from {}", origin)).dim()
        );
        println!("{}", "-".repeat(60));
        for (board, server) in entries {
            println!("{:<20} {}", board, server);
        }
        return Ok(());
    }

    for board in boards {
        let server = if probe {
            scraper.lister().confirmed_server(board).await
        } else {
            scraper.directory().resolve_server(board).await
        };
        println!("{:<20} {}", board, server);
    }

    Ok(())
}
