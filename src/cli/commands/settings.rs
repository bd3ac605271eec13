//! Collection settings commands.

use console::style;

use matome::pipeline::Pipeline;

use crate::cli::helpers::parse_boards;

/// Fields to change in the stored settings.
pub struct SettingsUpdate {
    pub boards: Option<String>,
    pub min_posts: Option<u32>,
    pub interval: Option<u32>,
    pub auto: Option<bool>,
    pub max_threads: Option<usize>,
}

/// Show the effective collection settings.
pub fn cmd_settings_show(pipeline: &Pipeline) -> anyhow::Result<()> {
    let stored = pipeline.settings().load().ok().flatten();
    let settings = pipeline.collection_settings()?;
    let last = pipeline
        .settings()
        .last_collection_at()?
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    println!("\n{}", style("Collection Settings").bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Target boards", settings.target_boards.join(", "));
    println!("{:<22} {}", "Minimum posts", settings.min_post_count);
    println!("{:<22} {}", "Max threads / board", settings.max_threads);
    println!("{:<22} {}h", "Interval", settings.collection_interval);
    println!(
        "{:<22} {}",
        "Auto collection",
        if settings.auto_collection_enabled { "on" } else { "off" }
    );
    println!("{:<22} {}", "Last collection", last);
    if stored.is_none() {
        println!(
            "{} Using configured defaults (nothing stored yet)",
            style("→").dim()
        );
    }

    Ok(())
}

/// Update stored collection settings.
pub fn cmd_settings_set(pipeline: &Pipeline, update: SettingsUpdate) -> anyhow::Result<()> {
    let mut settings = pipeline.collection_settings()?;

    if let Some(boards) = update.boards {
        let boards = parse_boards(&boards);
        if boards.is_empty() {
            anyhow::bail!("At least one board is required");
        }
        settings.target_boards = boards;
    }
    if let Some(min) = update.min_posts {
        settings.min_post_count = min;
    }
    if let Some(interval) = update.interval {
        settings.collection_interval = interval;
    }
    if let Some(auto) = update.auto {
        settings.auto_collection_enabled = auto;
    }
    if let Some(max) = update.max_threads {
        settings.max_threads = max.max(1);
    }

    pipeline.settings().save(&settings)?;
    println!("{} Settings saved", style("✓").green());
    cmd_settings_show(pipeline)
}
