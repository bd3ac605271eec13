//! Shared fixtures for integration tests: a scripted fetcher and page builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use matome::config::ScraperSettings;
use matome::http_client::{FetchError, FetchRequest, FetchedPage, PageFetcher, RequestMethod};

#[derive(Clone)]
enum Scripted {
    Page {
        status: StatusCode,
        body: String,
        headers: Vec<(String, String)>,
    },
    /// HEAD answers `status`; GET answers 200 with `body`.
    HeadRejected { status: StatusCode, body: String },
    Fail,
}

/// Fetcher that answers from a fixed script and records every request.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<(RequestMethod, String)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, url: &str, response: Scripted) -> Self {
        self.rescript(url, response);
        self
    }

    fn rescript(&self, url: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// 200 with `body` (HEAD gets the status only).
    pub fn page(self, url: &str, body: impl Into<String>) -> Self {
        self.script(
            url,
            Scripted::Page {
                status: StatusCode::OK,
                body: body.into(),
                headers: vec![(
                    "content-type".into(),
                    "text/html; charset=UTF-8".into(),
                )],
            },
        )
    }

    pub fn status(self, url: &str, status: StatusCode) -> Self {
        self.script(
            url,
            Scripted::Page {
                status,
                body: String::new(),
                headers: Vec::new(),
            },
        )
    }

    pub fn redirect(self, url: &str, location: &str) -> Self {
        self.script(
            url,
            Scripted::Page {
                status: StatusCode::MOVED_PERMANENTLY,
                body: String::new(),
                headers: vec![("location".into(), location.into())],
            },
        )
    }

    /// HEAD is refused with `status` (405, 501); GET serves `body`.
    pub fn head_rejected(self, url: &str, status: StatusCode, body: impl Into<String>) -> Self {
        self.script(
            url,
            Scripted::HeadRejected {
                status,
                body: body.into(),
            },
        )
    }

    /// Transport failure.
    pub fn fail(self, url: &str) -> Self {
        self.script(url, Scripted::Fail)
    }

    /// Make `url` fail from now on.
    pub fn start_failing(&self, url: &str) {
        self.rescript(url, Scripted::Fail);
    }

    pub fn got(&self, method: RequestMethod, url: &str) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|(m, u)| *m == method && u == url)
    }

    pub fn requests(&self) -> Vec<(RequestMethod, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Whether any request (HEAD or GET) was made for `url`.
    pub fn was_requested(&self, url: &str) -> bool {
        self.requests.lock().unwrap().iter().any(|(_, u)| u == url)
    }

    pub fn get_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, u)| *m == RequestMethod::Get && u == url)
            .count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.method, request.url.clone()));

        let scripted = self.responses.lock().unwrap().get(&request.url).cloned();
        match scripted {
            Some(Scripted::Page {
                status,
                body,
                headers,
            }) => {
                let body = match request.method {
                    RequestMethod::Get => body.into_bytes(),
                    RequestMethod::Head => Vec::new(),
                };
                let mut page = FetchedPage::new(request.url.clone(), status, body);
                for (name, value) in headers {
                    page = page.with_header(&name, value);
                }
                Ok(page)
            }
            Some(Scripted::HeadRejected { status, body }) => match request.method {
                RequestMethod::Head => Ok(FetchedPage::new(request.url.clone(), status, Vec::new())),
                RequestMethod::Get => Ok(FetchedPage::new(
                    request.url.clone(),
                    StatusCode::OK,
                    body.into_bytes(),
                )
                .with_header("content-type", "text/html; charset=UTF-8")),
            },
            Some(Scripted::Fail) | None => Err(FetchError::Unavailable(request.url.clone())),
        }
    }
}

/// Settings pointing at test hosts, with no delays.
pub fn test_settings() -> ScraperSettings {
    ScraperSettings {
        directory_sources: vec![
            "https://dir-a.test/".into(),
            "https://dir-b.test/".into(),
            "https://dir-c.test/".into(),
        ],
        fallback_boards: Default::default(),
        fallback_servers: vec![
            "https://backup1.2ch.sc".into(),
            "https://backup2.2ch.sc".into(),
        ],
        default_server: "https://default.2ch.sc".into(),
        board_delay_ms: 0,
        request_delay_ms: 0,
        ..ScraperSettings::default()
    }
}

/// A directory page linking each `(board, server_host)` pair.
pub fn directory_page(boards: &[(&str, &str)]) -> String {
    let links: String = boards
        .iter()
        .map(|(board, host)| format!("<a href=\"https://{}/{}/\">{}</a>\n", host, board, board))
        .collect();
    format!("<html><body><h1>板一覧</h1>{}</body></html>", links)
}

/// A subback-style board index that passes page validation.
pub fn board_index(threads: &[(u64, &str, u32)]) -> String {
    let links: String = threads
        .iter()
        .enumerate()
        .map(|(i, (key, title, count))| {
            format!(
                "<a href=\"{}/l50\">{}: {} ({})</a>\n",
                key,
                i + 1,
                title,
                count
            )
        })
        .collect();
    format!(
        "<html><head><title>スレッド一覧</title></head><body>\n\
         <div>書き込みの前にsetting.txtを読んでください</div>\n\
         <small id=\"trad\">{}</small>\n\
         <p>{}</p>\n\
         </body></html>",
        links,
        "掲示板のルールを守りましょう。".repeat(40)
    )
}

/// A classic `<dl>` thread page with `count` posts.
pub fn thread_page(count: u32) -> String {
    let posts: String = (1..=count)
        .map(|n| {
            format!(
                "<dt>{} ：<b>名無しさん</b>：2024/01/15(月) 12:{:02}:00.00 ID:abcd{:04}</dt>\
                 <dd> post number {} here </dd>\n",
                n,
                n % 60,
                n,
                n
            )
        })
        .collect();
    format!("<html><body><dl class=\"thread\">{}</dl></body></html>", posts)
}
