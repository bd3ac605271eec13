//! Shared helper functions for CLI commands.

use console::style;
use tokio_util::sync::CancellationToken;

/// Truncate to `max` characters, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a comma-separated board list.
pub fn parse_boards(list: &str) -> Vec<String> {
    list.split(',')
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect()
}

/// A token cancelled on the first Ctrl-C. The board being listed at that
/// moment is abandoned.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Interrupted, stopping...", style("!").yellow());
            handle.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("短いタイトル", 10), "短いタイトル");
        assert_eq!(truncate("とても長いスレッドタイトルです", 8), "とても長い...");
    }

    #[test]
    fn test_parse_boards() {
        assert_eq!(parse_boards("news4vip, livegalileo,,"), vec!["news4vip", "livegalileo"]);
    }
}
