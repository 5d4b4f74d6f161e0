//! Incremental decoding of a streamed text response.

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use tracing::trace;

use crate::error::StreamError;

/// UTF-8 decoder that carries incomplete multi-byte sequences across chunks.
///
/// Invalid bytes decode to U+FFFD, one per maximal invalid subpart, which is
/// what a browser `TextDecoder` does in its default non-fatal mode.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, holding back a trailing partial sequence for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end of stream. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Exclusive owner of a response body for the duration of a read loop.
///
/// The body is released when the reader drops, which happens exactly once on
/// every path out of the loop, including errors and cancellation.
pub struct ChunkReader<B> {
    body: B,
    chunks: usize,
    bytes: usize,
}

impl<B> ChunkReader<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    pub fn new(body: B) -> Self {
        Self {
            body,
            chunks: 0,
            bytes: 0,
        }
    }

    /// Next data chunk in arrival order. Trailer frames are skipped.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            match self.body.frame().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(StreamError::Read(e.to_string())),
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.chunks += 1;
                        self.bytes += data.len();
                        return Ok(Some(data));
                    }
                }
            }
        }
    }
}

impl<B> Drop for ChunkReader<B> {
    fn drop(&mut self) {
        trace!(
            chunks = self.chunks,
            bytes = self.bytes,
            "Released response body"
        );
    }
}

/// Read `body` to the end, calling `publish` with the whole accumulated text
/// after every chunk that decodes to something.
pub async fn read_text_stream<B, F>(body: B, mut publish: F) -> Result<String, StreamError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
    F: FnMut(&str),
{
    let mut reader = ChunkReader::new(body);
    let mut decoder = Utf8StreamDecoder::new();
    let mut accumulated = String::new();

    while let Some(chunk) = reader.next_chunk().await? {
        let text = decoder.decode(&chunk);
        if text.is_empty() {
            continue;
        }
        accumulated.push_str(&text);
        publish(&accumulated);
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        accumulated.push_str(&tail);
        publish(&accumulated);
    }

    Ok(accumulated)
}
