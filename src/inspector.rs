use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::InspectorConfig;
use crate::models::{Link, Status};
use crate::network::HttpClient;
use crate::parser;
use crate::pool::{Task, TaskError, WorkerPool};
use crate::visited::VisitedSet;

/// Product of one fetch task: the record to publish plus the body stream the
/// parse stage takes over. `None` results mean the task produced nothing to
/// report (external skip or duplicate URL).
pub struct FetchOutcome {
    pub link: Link,
    pub body: Option<reqwest::Response>,
}

/// Pipeline controller.
///
/// Couples the fetch and parse worker pools through their result and error
/// channels, owns the outstanding-work counter, and signals completion once
/// the frontier drains. Workers never talk back to the controller directly;
/// everything flows upward through the channels.
pub struct Inspector {
    base_url: Url,
    excluded_codes: HashSet<u16>,
    log_external_links: bool,
    retry_attempts: u8,
    retry_delay: Duration,
    client: HttpClient,
    visited: Arc<VisitedSet>,
    to_print: mpsc::Sender<Link>,
}

impl Inspector {
    pub fn new(
        cfg: &InspectorConfig,
        client: HttpClient,
        visited: Arc<VisitedSet>,
        to_print: mpsc::Sender<Link>,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&cfg.host)?;

        Ok(Self {
            base_url,
            excluded_codes: cfg.skip_status_codes.iter().copied().collect(),
            log_external_links: cfg.log_external_links,
            retry_attempts: cfg.retry_attempts,
            retry_delay: cfg.retry_delay,
            client,
            visited,
            to_print,
        })
    }

    /// Crawl from `start_path` until every scheduled fetch and parse task has
    /// completed, then cancel the shared token (stopping the pools) and
    /// signal `done`.
    ///
    /// A single unit on the work counter stands for either a pending fetch or
    /// a pending parse. A fetch below the client-error threshold hands its
    /// unit over to the parse task it spawns; every other outcome retires it.
    /// The counter is touched only from this loop, so reaching zero is an
    /// unambiguous termination signal.
    pub async fn inspect(&self, cancel: CancellationToken, start_path: &str, done: mpsc::Sender<()>) {
        let max_workers = num_cpus::get();
        let (fetch_pool, mut fetch_rx) =
            WorkerPool::<Option<FetchOutcome>>::new(max_workers, cancel.clone());
        let (parse_pool, mut parse_rx) =
            WorkerPool::<Vec<String>>::new(max_workers, cancel.clone());

        let mut pending: usize = 1;
        if fetch_pool
            .add_task(self.fetch_task(start_path.to_string()))
            .is_err()
        {
            pending = 0;
        }

        while pending > 0 {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(outcome) = fetch_rx.results.recv() => {
                    match outcome {
                        None => pending -= 1,
                        Some(FetchOutcome { link, body }) => {
                            if self.excluded_codes.contains(&link.status.code()) {
                                pending -= 1;
                                continue;
                            }

                            let parseable = link.status.is_parseable();
                            let _ = self.to_print.send(link).await;

                            match body {
                                Some(body) if parseable => {
                                    // The parse task inherits this unit of work.
                                    if parse_pool.add_task(self.parse_task(body)).is_err() {
                                        pending -= 1;
                                    }
                                }
                                _ => pending -= 1,
                            }
                        }
                    }
                }

                Some(e) = fetch_rx.errors.recv() => {
                    tracing::error!("error doing http request: {e}");
                    pending -= 1;
                }

                Some(hrefs) = parse_rx.results.recv() => {
                    for href in hrefs {
                        pending += 1;
                        if fetch_pool.add_task(self.fetch_task(href)).is_err() {
                            pending -= 1;
                        }
                    }
                    pending -= 1;
                }

                Some(e) = parse_rx.errors.recv() => {
                    tracing::error!("error parsing page content: {e}");
                    pending -= 1;
                }
            }
        }

        cancel.cancel();
        let _ = done.send(()).await;
    }

    fn fetch_task(&self, path: String) -> Task<Option<FetchOutcome>> {
        let base_url = self.base_url.clone();
        let client = self.client.clone();
        let visited = Arc::clone(&self.visited);
        let log_external_links = self.log_external_links;

        Box::new(move |cancel| {
            async move {
                Ok(fetch_one(base_url, client, visited, log_external_links, path, cancel).await)
            }
            .boxed()
        })
    }

    fn parse_task(&self, body: reqwest::Response) -> Task<Vec<String>> {
        let retry_attempts = self.retry_attempts;
        let retry_delay = self.retry_delay;

        Box::new(move |cancel| {
            async move {
                parser::extract_from_response(body, retry_attempts, retry_delay, &cancel)
                    .await
                    .map_err(|e| Box::new(e) as TaskError)
            }
            .boxed()
        })
    }
}

/// Body of one fetch task.
///
/// Resolves the path, classifies external references, skips already-visited
/// URLs (bumping their occurrence counter), and otherwise fetches. The final
/// insert into the visited set is the authoritative deduplication point: a
/// task that loses the insert race discards its record and returns `None`.
async fn fetch_one(
    base_url: Url,
    client: HttpClient,
    visited: Arc<VisitedSet>,
    log_external_links: bool,
    path: String,
    cancel: CancellationToken,
) -> Option<FetchOutcome> {
    let target = match resolve_href(&base_url, &path) {
        Ok(url) => url,
        Err(_) => return store(&visited, Link::new(path, Status::Error), None),
    };

    if !same_authority(&target, &base_url) {
        if log_external_links {
            return store(&visited, Link::new(target.to_string(), Status::External), None);
        }
        return None;
    }

    let url = target.to_string();
    if visited.note_duplicate(&url) {
        return None;
    }

    match client.fetch(&target, &cancel).await {
        Ok(response) => {
            let code = response.status().as_u16();
            store(&visited, Link::new(url, Status::Http(code)), Some(response))
        }
        Err(e) => {
            tracing::debug!("fetch failed for {url}: {e}");
            store(&visited, Link::new(url, Status::Error), None)
        }
    }
}

fn store(
    visited: &VisitedSet,
    link: Link,
    body: Option<reqwest::Response>,
) -> Option<FetchOutcome> {
    if visited.load_or_store(link.clone()) {
        // Another task inserted this URL first; drop our record.
        return None;
    }
    Some(FetchOutcome { link, body })
}

/// Resolve an anchor target against the base URL. Absolute URLs pass
/// through; values carrying a malformed scheme are rejected rather than
/// silently treated as relative paths.
fn resolve_href(base: &Url, href: &str) -> Result<Url, url::ParseError> {
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(e) if href.contains("://") => Err(e),
        Err(_) => base.join(href),
    }
}

fn same_authority(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
