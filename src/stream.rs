//! Streaming connection to the v2 filtered and sampled stream endpoints.
//!
//! One connection is held open and read chunk by chunk; complete lines are
//! handed to a sink. On disconnect the loop reconnects with the backoff
//! schedule the platform documents: linear to one minute, then exponential
//! capped at sixteen minutes.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{
    config::StreamConfig,
    error::{StreamFilterError, StreamResult},
};

const FILTERED_PATH: &str = "/2/tweets/search/stream";
const SAMPLED_PATH: &str = "/2/tweets/sample/stream";

/// How long to wait for the next chunk before treating the connection as
/// stalled. The platform sends a keep-alive at least every 20 seconds.
const READ_TIMEOUT: Duration = Duration::from_secs(90);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which streaming endpoint to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Messages matching the server-stored rules.
    Filtered,

    /// An unfiltered random sample of messages.
    Sampled,
}

impl StreamKind {
    pub(crate) fn path(self) -> &'static str {
        match self {
            Self::Filtered => FILTERED_PATH,
            Self::Sampled => SAMPLED_PATH,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Filtered => "filtered",
            Self::Sampled => "sampled",
        }
    }
}

/// Destination for received message lines.
pub trait LineSink {
    fn accept(&mut self, line: &str) -> StreamResult<()>;
}

/// Run the stream until the process is terminated, forwarding every received
/// line to `sink`. Only sink failures end the loop; network errors reconnect.
pub async fn run(
    config: &StreamConfig,
    kind: StreamKind,
    sink: &mut impl LineSink,
) -> StreamResult<()> {
    let url = format!("{}{}", config.api_url.trim_end_matches('/'), kind.path());

    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(60 * 16);
    let linear_threshold = Duration::from_secs(60);
    let mut total: u64 = 0;

    loop {
        info!(url = %url, kind = kind.label(), "connecting to stream");

        match connect(&url, &config.bearer_token).await {
            Ok(response) => {
                backoff = Duration::from_secs(1);

                match forward_lines(response, sink, &mut total).await {
                    Ok(()) => warn!(total, "stream ended"),
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, "stream read error");
                    }
                    // Sink or decode failures are not recoverable by
                    // reconnecting.
                    Err(e) => return Err(e),
                }
            }
            Err(e) => error!(error = %e, "failed to connect to stream"),
        }

        info!(delay_secs = backoff.as_secs(), "reconnecting after delay");
        tokio::time::sleep(backoff).await;

        if backoff < linear_threshold {
            backoff += Duration::from_secs(1);
        } else {
            backoff = std::cmp::min(backoff * 2, max_backoff);
        }
    }
}

/// Open the streaming connection, failing on a non-2xx response.
pub(crate) async fn connect(url: &str, bearer_token: &str) -> StreamResult<reqwest::Response> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()?;

    let response = client
        .get(url)
        .header("Authorization", format!("Bearer {bearer_token}"))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(StreamFilterError::Api {
            status,
            message: body,
            retry_after: None,
        });
    }

    Ok(response)
}

/// Copy complete lines from the response body into the sink until the
/// connection ends. Blank keep-alive lines are dropped; in-stream error
/// payloads are logged but still forwarded verbatim. A trailing line left
/// unterminated when the connection closes is flushed too.
pub(crate) async fn forward_lines(
    response: reqwest::Response,
    sink: &mut impl LineSink,
    total: &mut u64,
) -> StreamResult<()> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk?;

        // Keep-alive heartbeat
        if chunk.is_empty() || chunk[..] == b"\r\n"[..] {
            debug!("received heartbeat");
            continue;
        }

        buffer.extend_from_slice(&chunk);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            deliver(&line, sink, total)?;
        }
    }

    // The connection can close mid-line; whatever is buffered is still a
    // received payload.
    if !buffer.is_empty() {
        deliver(&buffer, sink, total)?;
    }

    Ok(())
}

fn deliver(line: &[u8], sink: &mut impl LineSink, total: &mut u64) -> StreamResult<()> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();

    if text.is_empty() {
        return Ok(());
    }

    if let Some(message) = in_stream_error(text) {
        warn!(message = %message, "stream reported an error");
    }

    sink.accept(text)?;
    *total += 1;
    if *total % 1000 == 0 {
        info!(count = *total, "messages received");
    }
    Ok(())
}

/// Detect an error object delivered on the stream itself.
fn in_stream_error(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    if value.get("errors").is_none() && value.get("title").is_none() {
        return None;
    }
    Some(
        value
            .get("detail")
            .or_else(|| value.get("title"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown stream error")
            .to_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    impl LineSink for Vec<String> {
        fn accept(&mut self, line: &str) -> StreamResult<()> {
            self.push(line.to_owned());
            Ok(())
        }
    }

    #[test]
    fn kinds_map_to_endpoints() {
        assert_eq!(StreamKind::Filtered.path(), "/2/tweets/search/stream");
        assert_eq!(StreamKind::Sampled.path(), "/2/tweets/sample/stream");
    }

    #[test]
    fn tweets_are_not_in_stream_errors() {
        assert!(in_stream_error(r#"{"data":{"id":"1","text":"hi"}}"#).is_none());
    }

    #[test]
    fn error_payloads_are_detected() {
        let line = r#"{"title":"ConnectionException","detail":"This stream is currently at the maximum allowed connection limit."}"#;
        let message = in_stream_error(line).unwrap();
        assert!(message.contains("maximum allowed connection limit"));
    }

    #[test]
    fn non_json_lines_are_not_errors() {
        assert!(in_stream_error("garbage").is_none());
    }

    #[tokio::test]
    async fn forwards_each_line_to_the_sink() {
        let server = MockServer::start().await;

        let body = concat!(
            "{\"data\":{\"id\":\"1\",\"text\":\"first\"}}\n",
            "\r\n",
            "{\"data\":{\"id\":\"2\",\"text\":\"second\"}}\r\n",
        );

        Mock::given(method("GET"))
            .and(path(SAMPLED_PATH))
            .and(header("Authorization", "Bearer test-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let url = format!("{}{}", server.uri(), SAMPLED_PATH);
        let response = connect(&url, "test-bearer").await.unwrap();

        let mut lines: Vec<String> = Vec::new();
        let mut total = 0;
        forward_lines(response, &mut lines, &mut total).await.unwrap();

        assert_eq!(total, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"first\""));
        assert!(lines[1].contains("\"second\""));
    }

    #[tokio::test]
    async fn unterminated_trailing_line_is_flushed() {
        let server = MockServer::start().await;

        // The last payload has no trailing newline, as when the connection
        // drops mid-stream.
        let body = concat!(
            "{\"data\":{\"id\":\"1\",\"text\":\"first\"}}\n",
            "{\"data\":{\"id\":\"2\",\"text\":\"last\"}}",
        );

        Mock::given(method("GET"))
            .and(path(SAMPLED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let url = format!("{}{}", server.uri(), SAMPLED_PATH);
        let response = connect(&url, "test-bearer").await.unwrap();

        let mut lines: Vec<String> = Vec::new();
        let mut total = 0;
        forward_lines(response, &mut lines, &mut total).await.unwrap();

        assert_eq!(total, 2);
        assert!(lines[1].contains("\"last\""));
    }

    #[tokio::test]
    async fn error_payloads_are_still_forwarded() {
        let server = MockServer::start().await;

        let body = "{\"title\":\"OperationalDisconnect\",\"detail\":\"forced disconnect\"}\n";

        Mock::given(method("GET"))
            .and(path(FILTERED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let url = format!("{}{}", server.uri(), FILTERED_PATH);
        let response = connect(&url, "test-bearer").await.unwrap();

        let mut lines: Vec<String> = Vec::new();
        let mut total = 0;
        forward_lines(response, &mut lines, &mut total).await.unwrap();

        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("OperationalDisconnect"));
    }

    #[tokio::test]
    async fn non_success_connect_is_an_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(FILTERED_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let url = format!("{}{}", server.uri(), FILTERED_PATH);
        let err = connect(&url, "bad-token").await.unwrap_err();
        assert!(matches!(err, StreamFilterError::Api { status: 401, .. }));
    }
}
