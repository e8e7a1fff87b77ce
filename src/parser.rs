use std::time::Duration;

use reqwest::Response;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::network::is_connection_reset;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("page body already consumed")]
    BodyConsumed,

    #[error("read cancelled")]
    Cancelled,

    #[error("failed to read page body: {0}")]
    Body(String),
}

/// Extract every `href` attribute value of every anchor element, in document
/// order. Duplicates and malformed values are kept; classifying them is the
/// pipeline's job, not the extractor's.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("anchor selector");

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href").map(str::to_string))
        .collect()
}

/// Consume a response body and extract its anchor targets.
///
/// Reads that die with a peer reset are retried with the same envelope as
/// the fetcher. A retry cannot re-read an already-consumed stream, so it
/// fails with [`ParseError::BodyConsumed`]; the body is dropped, and thereby
/// released, on every exit path.
pub async fn extract_from_response(
    body: Response,
    retry_attempts: u8,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ParseError> {
    let max_attempts = retry_attempts.max(1);
    let mut attempt: u8 = 0;
    let mut body = Some(body);

    loop {
        let read = match body.take() {
            Some(response) => read_body(response, cancel).await,
            None => Err(ParseError::BodyConsumed),
        };

        match read {
            Ok(html) => return Ok(extract_links(&html)),
            Err(ParseError::ConnectionReset) if attempt + 1 < max_attempts => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ParseError::ConnectionReset),
                    _ = tokio::time::sleep(retry_delay) => attempt += 1,
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn read_body(response: Response, cancel: &CancellationToken) -> Result<String, ParseError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ParseError::Cancelled),
        text = response.text() => text.map_err(|e| {
            if is_connection_reset(&e) {
                ParseError::ConnectionReset
            } else {
                ParseError::Body(e.to_string())
            }
        }),
    }
}
