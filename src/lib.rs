//! matome - popular thread collection for 5ch/2ch matome curation.
//!
//! Finds the server hosting each board, lists threads above a post-count
//! threshold, and extracts posts from thread pages on demand.

pub mod config;
pub mod encoding;
pub mod http_client;
pub mod pipeline;
pub mod rate_limit;
pub mod scrape;
pub mod storage;
