//! Incremental UTF-8 decoding of a streamed response body.
//!
//! Chunk boundaries from the network fall anywhere, including inside a
//! multi-byte character. [`Utf8StreamDecoder`] holds back an incomplete
//! trailing sequence until the next chunk completes it; invalid bytes become
//! `U+FFFD`.

use futures::{Stream, StreamExt};

use super::{TextStream, TransportError};

/// Streaming UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create a decoder with no buffered bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush bytes still buffered at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Number of bytes waiting for the rest of their character.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Adapt a byte stream into a [`TextStream`] of decoded fragments.
///
/// Empty fragments are skipped. The first error ends the stream.
pub fn decode_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let out = async_stream::stream! {
        let mut decoder = Utf8StreamDecoder::new();
        let mut failed = false;

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    let text = decoder.decode(chunk.as_ref());
                    if !text.is_empty() {
                        yield Ok::<String, TransportError>(text);
                    }
                }
                Err(e) => {
                    let err: TransportError = e.into();
                    yield Err(err);
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            let tail = decoder.finish();
            if !tail.is_empty() {
                yield Ok(tail);
            }
        }
    };

    Box::pin(out)
}
