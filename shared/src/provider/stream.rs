//! Streaming-to-blocking primitives.
//!
//! [`collect_stream`] runs a producer task that forwards increments through
//! a bounded channel while the caller buffers them in receipt order.
//! Cancellation is observed on both sides, so a producer blocked on a full
//! channel never outlives the request.

use super::ProviderError;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the increment channel.
pub const CHANNEL_CAPACITY: usize = 32;

/// Collects every increment of `stream` into one string.
///
/// # Errors
///
/// Returns the first error yielded by the stream, or
/// [`ProviderError::Cancelled`] if `cancel` fires first.
pub async fn collect_stream<S>(stream: S, cancel: &CancellationToken) -> Result<String, ProviderError>
where
    S: Stream<Item = Result<String, ProviderError>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let producer_cancel = cancel.clone();

    let producer = tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        loop {
            let next = tokio::select! {
                () = producer_cancel.cancelled() => return,
                next = stream.next() => next,
            };
            let Some(item) = next else {
                return;
            };
            tokio::select! {
                () = producer_cancel.cancelled() => return,
                sent = tx.send(item) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut buffer = String::new();
    let mut increments = 0usize;
    let result = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break Err(ProviderError::Cancelled),
            item = rx.recv() => match item {
                Some(Ok(text)) => {
                    increments += 1;
                    buffer.push_str(&text);
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(std::mem::take(&mut buffer)),
            },
        }
    };

    producer.abort();
    tracing::debug!(increments, ok = result.is_ok(), "Collected generation stream");
    result
}

/// Splits a byte stream into text lines, tolerating lines split across chunks.
///
/// Trailing `\r` is removed. A final line without newline is emitted at the
/// end of the stream.
pub(crate) fn line_stream<S, B, E>(
    bytes: S,
    provider: &'static str,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = (Box::pin(bytes), LineDecoder::default(), VecDeque::new(), false);
    futures::stream::unfold(state, move |(mut bytes, mut decoder, mut pending, mut done)| async move {
        loop {
            if let Some(line) = pending.pop_front() {
                return Some((Ok(line), (bytes, decoder, pending, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    done = true;
                    let err = ProviderError::transport(provider, e);
                    return Some((Err(err), (bytes, decoder, pending, done)));
                }
                None => {
                    done = true;
                    pending.extend(decoder.finish());
                }
            }
        }
    })
}

/// Payload of a server-sent events `data:` line, if `line` is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim).filter(|d| !d.is_empty())
}

#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&*text).to_string()
}
