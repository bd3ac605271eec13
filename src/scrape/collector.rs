//! Multi-board collection runs.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::threads::ThreadLister;
use super::ScrapedThread;
use crate::config::ScrapingConfig;

/// Sort by post count, highest first, keeping index order for ties, then
/// truncate to `cap`.
pub fn rank_by_post_count(threads: &mut Vec<ScrapedThread>, cap: usize) {
    threads.sort_by(|a, b| b.post_count.cmp(&a.post_count));
    threads.truncate(cap);
}

/// Outcome of one collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    /// Ranked threads across all boards.
    pub threads: Vec<ScrapedThread>,
    pub boards_succeeded: Vec<String>,
    pub boards_failed: Vec<String>,
    /// The run stopped early; `threads` holds what was gathered so far.
    pub cancelled: bool,
}

impl CollectionReport {
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// Runs the thread lister across boards, one board at a time.
pub struct ThreadCollector {
    lister: ThreadLister,
    board_delay: Duration,
}

impl ThreadCollector {
    pub fn new(lister: ThreadLister, board_delay: Duration) -> Self {
        Self {
            lister,
            board_delay,
        }
    }

    pub fn lister(&self) -> &ThreadLister {
        &self.lister
    }

    /// Collect threads from every configured board.
    ///
    /// Boards are visited in order with a pause between them. A failing
    /// board is logged and skipped. Cancellation stops the run between or
    /// during boards and returns what was gathered.
    pub async fn collect_threads(
        &self,
        config: &ScrapingConfig,
        cancel: &CancellationToken,
    ) -> CollectionReport {
        let mut report = CollectionReport::default();

        for (i, board) in config.boards().iter().enumerate() {
            if i > 0 && !self.board_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.board_delay) => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                result = self.lister.try_list_threads(board, config) => result,
            };

            match result {
                Ok(threads) => {
                    info!("{}: {} threads", board, threads.len());
                    report.threads.extend(threads);
                    report.boards_succeeded.push(board.clone());
                }
                Err(e) => {
                    warn!("Skipping board {}: {}", board, e);
                    report.boards_failed.push(board.clone());
                }
            }
        }

        if report.cancelled {
            warn!(
                "Collection cancelled after {} boards",
                report.boards_succeeded.len() + report.boards_failed.len()
            );
        }

        rank_by_post_count(&mut report.threads, config.total_cap());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(title: &str, count: u32) -> ScrapedThread {
        ScrapedThread {
            title: title.into(),
            url: format!("https://viper.2ch.sc/test/read.cgi/news4vip/{}/", title),
            post_count: count,
            board: "news4vip".into(),
        }
    }

    #[test]
    fn test_rank_is_stable_and_capped() {
        let mut threads = vec![
            thread("a", 10),
            thread("b", 50),
            thread("c", 10),
            thread("d", 70),
        ];
        rank_by_post_count(&mut threads, 3);
        let titles: Vec<_> = threads.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["d", "b", "a"]);
    }
}
