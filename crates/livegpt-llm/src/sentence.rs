//! Sentence-boundary chunking of a delta stream.
//!
//! Synthesis latency hides behind the model's own pace when each sentence
//! is spoken as soon as it is complete. The boundary rule is a strategy:
//! the default releases on a trailing `'.'`, which is what the prompt
//! instructs the model to produce. The language-prefix parser downstream
//! assumes chunk boundaries line up with this rule; change both together.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::client::DeltaStream;
use crate::error::CompletionError;

/// Decides when the accumulated buffer is ready to be released.
pub trait SentenceSplitter: Send + Sync {
    fn should_release(&self, buffer: &str) -> bool;
}

/// Releases whenever the buffer's trimmed tail ends in a full stop.
pub struct PeriodSplitter;

impl SentenceSplitter for PeriodSplitter {
    fn should_release(&self, buffer: &str) -> bool {
        buffer.trim_end().ends_with('.')
    }
}

/// Accumulates raw deltas and yields sentence-sized chunks.
///
/// The concatenation of every chunk equals the concatenation of every
/// delta; nothing is trimmed or dropped.
pub struct SentenceStream {
    inner: DeltaStream,
    splitter: Arc<dyn SentenceSplitter>,
    buffer: String,
    done: bool,
}

impl SentenceStream {
    pub fn new(inner: DeltaStream) -> Self {
        Self::with_splitter(inner, Arc::new(PeriodSplitter))
    }

    pub fn with_splitter(inner: DeltaStream, splitter: Arc<dyn SentenceSplitter>) -> Self {
        Self {
            inner,
            splitter,
            buffer: String::new(),
            done: false,
        }
    }

    /// Next sentence chunk; `None` once the underlying stream is
    /// exhausted and the final partial chunk (if any) has been returned.
    /// Errors propagate once and end the stream.
    pub async fn recv(&mut self) -> Option<Result<String, CompletionError>> {
        if self.done {
            return None;
        }

        loop {
            match self.inner.next().await {
                Some(Ok(delta)) => {
                    self.buffer.push_str(&delta);
                    if !self.buffer.trim().is_empty() && self.splitter.should_release(&self.buffer)
                    {
                        return Some(Ok(std::mem::take(&mut self.buffer)));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    let rest = std::mem::take(&mut self.buffer);
                    if rest.trim().is_empty() {
                        return None;
                    }
                    return Some(Ok(rest));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn deltas(parts: &[&str]) -> DeltaStream {
        let items: Vec<Result<String, CompletionError>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::pin(stream::iter(items))
    }

    async fn collect(mut stream: SentenceStream) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.recv().await {
            chunks.push(chunk.unwrap());
        }
        chunks
    }

    #[tokio::test]
    async fn splits_on_trailing_period() {
        let stream = SentenceStream::new(deltas(&["Hello", " world. ", "How", " are you"]));
        let chunks = collect(stream).await;
        assert_eq!(chunks, vec!["Hello world. ", "How are you"]);
    }

    #[tokio::test]
    async fn final_partial_chunk_released_on_end() {
        let stream = SentenceStream::new(deltas(&["One.", " trailing"]));
        let chunks = collect(stream).await;
        assert_eq!(chunks, vec!["One.", " trailing"]);
    }

    #[tokio::test]
    async fn whitespace_tail_is_swallowed() {
        let stream = SentenceStream::new(deltas(&["Done.", "  "]));
        let chunks = collect(stream).await;
        assert_eq!(chunks, vec!["Done."]);
    }

    #[tokio::test]
    async fn concatenation_matches_deltas() {
        let parts = ["A", "b. ", "C", "d", ". ", "tail"];
        let stream = SentenceStream::new(deltas(&parts));
        let chunks = collect(stream).await;
        assert_eq!(chunks.concat(), parts.concat());
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let mut stream = SentenceStream::new(deltas(&[]));
        assert!(stream.recv().await.is_none());
        // recv after exhaustion keeps returning None
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn errors_propagate_and_end_the_stream() {
        let items: Vec<Result<String, CompletionError>> = vec![
            Ok("Fine so far.".to_string()),
            Err(CompletionError::RateLimited),
            Ok("never seen".to_string()),
        ];
        let mut stream = SentenceStream::new(Box::pin(stream::iter(items)));

        assert_eq!(stream.recv().await.unwrap().unwrap(), "Fine so far.");
        assert!(matches!(
            stream.recv().await.unwrap(),
            Err(CompletionError::RateLimited)
        ));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn custom_splitter_is_honored() {
        struct NewlineSplitter;
        impl SentenceSplitter for NewlineSplitter {
            fn should_release(&self, buffer: &str) -> bool {
                buffer.ends_with('\n')
            }
        }

        let stream = SentenceStream::with_splitter(
            deltas(&["line one\n", "line two"]),
            Arc::new(NewlineSplitter),
        );
        let chunks = collect(stream).await;
        assert_eq!(chunks, vec!["line one\n", "line two"]);
    }
}
