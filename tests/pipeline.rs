//! Collection runs and lazy post hydration against a temporary database.

mod common;

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{board_index, directory_page, test_settings, thread_page, ScriptedFetcher};
use matome::config::CollectionSettings;
use matome::pipeline::{CollectionOverrides, Pipeline};
use matome::scrape::BoardScraper;
use matome::storage::{SettingsRepository, ThreadRepository};

const THREAD: &str = "https://viper.2ch.sc/test/read.cgi/news4vip/1700000001/";

fn upstream() -> ScriptedFetcher {
    ScriptedFetcher::new()
        .page(
            "https://dir-a.test/",
            directory_page(&[("news4vip", "viper.2ch.sc")]),
        )
        .page(
            "https://viper.2ch.sc/news4vip/",
            board_index(&[
                (1700000001, "晩飯スレ", 320),
                (1700000002, "雑談", 150),
                (1700000003, "過疎", 4),
            ]),
        )
        .page(THREAD, thread_page(8))
}

fn pipeline_at(fetcher: &Arc<ScriptedFetcher>, db_path: &Path, boards: &[&str]) -> Pipeline {
    let defaults = CollectionSettings {
        target_boards: boards.iter().map(|b| b.to_string()).collect(),
        ..Default::default()
    };
    Pipeline::new(
        BoardScraper::new(fetcher.clone(), &test_settings()),
        ThreadRepository::new(db_path).unwrap(),
        SettingsRepository::new(db_path).unwrap(),
        defaults,
    )
}

fn pipeline(fetcher: &Arc<ScriptedFetcher>) -> (TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_at(fetcher, &dir.path().join("matome.db"), &["news4vip"]);
    (dir, pipeline)
}

#[tokio::test]
async fn repeated_collection_is_idempotent() {
    let fetcher = Arc::new(upstream());
    let (_dir, pipeline) = pipeline(&fetcher);
    let cancel = CancellationToken::new();

    let first = pipeline
        .run_collection(&CollectionOverrides::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.report.threads.len(), 2);
    assert_eq!(first.new_threads, 2);

    let second = pipeline
        .run_collection(&CollectionOverrides::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(second.new_threads, 0);

    let stored = pipeline.threads().list(None, 10).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].post_count, 320);
    assert!(pipeline.settings().last_collection_at().unwrap().is_some());
}

#[tokio::test]
async fn overrides_do_not_become_stored_settings() {
    let fetcher = Arc::new(upstream());
    let (_dir, pipeline) = pipeline(&fetcher);
    let overrides = CollectionOverrides {
        min_post_count: Some(200),
        ..Default::default()
    };

    let outcome = pipeline
        .run_collection(&overrides, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.report.threads.len(), 1);

    assert!(pipeline.settings().load().unwrap().is_none());
    assert_eq!(pipeline.collection_settings().unwrap().min_post_count, 100);
    assert!(!pipeline.is_collection_due(chrono::Utc::now()).unwrap());
}

#[tokio::test]
async fn configured_defaults_apply_until_settings_are_saved() {
    let fetcher = Arc::new(upstream());
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("matome.db");
    let cancel = CancellationToken::new();

    let first = pipeline_at(&fetcher, &db_path, &["news4vip"]);
    first
        .run_collection(&CollectionOverrides::default(), &cancel)
        .await
        .unwrap();
    assert!(first.settings().last_collection_at().unwrap().is_some());

    // Same database, edited config file.
    let second = pipeline_at(&fetcher, &db_path, &["newsplus"]);
    assert_eq!(second.collection_settings().unwrap().target_boards, vec!["newsplus"]);
    let outcome = second
        .run_collection(&CollectionOverrides::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.report.boards_failed, vec!["newsplus"]);
    assert!(outcome.report.boards_succeeded.is_empty());
}

#[tokio::test]
async fn unreadable_stored_settings_fall_back_to_defaults() {
    let fetcher = Arc::new(upstream());
    let (dir, pipeline) = pipeline(&fetcher);
    let conn = Connection::open(dir.path().join("matome.db")).unwrap();
    conn.execute(
        "INSERT INTO collection_settings (id, data, updated_at) VALUES (1, '{not json', '2024-01-01T00:00:00Z')",
        [],
    )
    .unwrap();

    assert_eq!(
        pipeline.collection_settings().unwrap().target_boards,
        vec!["news4vip"]
    );
    let outcome = pipeline
        .run_collection(&CollectionOverrides::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.report.boards_succeeded, vec!["news4vip"]);
    assert_eq!(outcome.report.threads.len(), 2);
}

#[tokio::test]
async fn failed_run_is_not_recorded() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (_dir, pipeline) = pipeline(&fetcher);

    let outcome = pipeline
        .run_collection(&CollectionOverrides::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.nothing_collected());
    assert_eq!(outcome.report.boards_failed, vec!["news4vip"]);
    assert!(pipeline.settings().last_collection_at().unwrap().is_none());
}

#[tokio::test]
async fn posts_are_fetched_once_then_served_from_storage() {
    let fetcher = Arc::new(upstream());
    let (_dir, pipeline) = pipeline(&fetcher);
    pipeline
        .run_collection(&CollectionOverrides::default(), &CancellationToken::new())
        .await
        .unwrap();

    let thread = pipeline.threads().get_by_url(THREAD).unwrap().unwrap();
    assert!(thread.posts_fetched_at.is_none());

    let posts = pipeline.hydrate_posts(&thread, false).await.unwrap();
    assert_eq!(posts.len(), 8);
    assert_eq!(fetcher.get_count(THREAD), 1);

    let thread = pipeline.threads().get(thread.id).unwrap().unwrap();
    assert!(thread.posts_fetched_at.is_some());
    let again = pipeline.hydrate_posts(&thread, false).await.unwrap();
    assert_eq!(again.len(), 8);
    assert_eq!(fetcher.get_count(THREAD), 1);

    pipeline.hydrate_posts(&thread, true).await.unwrap();
    assert_eq!(fetcher.get_count(THREAD), 2);
}
