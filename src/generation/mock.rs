//! Scripted text generator for tests and offline runs.

use crate::error::GenerationError;
use crate::generation::{FragmentStream, StreamRequest, StructuredRequest, TextGenerator};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock generator for testing
///
/// Streams a fixed list of fragments and answers structured calls by schema
/// name. Every call is recorded so tests can assert on what was sent.
#[derive(Debug)]
pub struct MockGenerator {
    fragments: Vec<String>,
    stream_failure: Option<GenerationError>,
    mid_stream_failure: Option<(usize, GenerationError)>,
    fragment_delay: Option<Duration>,
    structured_delay: Option<Duration>,
    responses: HashMap<String, Result<String, GenerationError>>,
    stream_calls: AtomicUsize,
    stream_requests: Mutex<Vec<StreamRequest>>,
    structured_requests: Mutex<Vec<StructuredRequest>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    /// Create a mock with default responses
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            "review".to_string(),
            Ok(review_json("mock corrected transcription", "mock changelog")),
        );
        responses.insert("summary".to_string(), Ok(summary_json("mock summary")));
        Self {
            fragments: vec!["mock transcription".to_string()],
            stream_failure: None,
            mid_stream_failure: None,
            fragment_delay: None,
            structured_delay: None,
            responses,
            stream_calls: AtomicUsize::new(0),
            stream_requests: Mutex::new(Vec::new()),
            structured_requests: Mutex::new(Vec::new()),
        }
    }

    /// Fragments yielded by the transcription stream
    pub fn with_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = fragments.into_iter().map(Into::into).collect();
        self
    }

    /// Fail the stream before the first fragment
    pub fn with_stream_failure(mut self, error: GenerationError) -> Self {
        self.stream_failure = Some(error);
        self
    }

    /// Fail the stream after `after` fragments were delivered
    pub fn with_mid_stream_failure(mut self, after: usize, error: GenerationError) -> Self {
        self.mid_stream_failure = Some((after, error));
        self
    }

    /// Sleep before each fragment
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    /// Sleep before answering structured calls
    pub fn with_structured_delay(mut self, delay: Duration) -> Self {
        self.structured_delay = Some(delay);
        self
    }

    pub fn with_review(self, corrected: &str, changelog: &str) -> Self {
        self.with_raw_response("review", &review_json(corrected, changelog))
    }

    pub fn with_summary(self, summary: &str) -> Self {
        self.with_raw_response("summary", &summary_json(summary))
    }

    /// Answer calls for `schema` with `raw` text, valid or not
    pub fn with_raw_response(mut self, schema: &str, raw: &str) -> Self {
        self.responses
            .insert(schema.to_string(), Ok(raw.to_string()));
        self
    }

    pub fn with_structured_failure(mut self, schema: &str, error: GenerationError) -> Self {
        self.responses.insert(schema.to_string(), Err(error));
        self
    }

    /// Number of streaming calls made
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        lock(&self.stream_requests).clone()
    }

    /// Number of structured calls made for `schema`
    pub fn structured_calls(&self, schema: &str) -> usize {
        lock(&self.structured_requests)
            .iter()
            .filter(|r| r.schema.name == schema)
            .count()
    }

    /// Transcriptions sent to the summary stage, in call order
    pub fn summary_inputs(&self) -> Vec<String> {
        lock(&self.structured_requests)
            .iter()
            .filter(|r| r.schema.name == "summary")
            .filter_map(|r| r.prompt.split_once("Transcription:\n"))
            .map(|(_, text)| text.strip_suffix('\n').unwrap_or(text).to_string())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn review_json(corrected: &str, changelog: &str) -> String {
    serde_json::json!({ "correctedTranscription": corrected, "changelog": changelog }).to_string()
}

fn summary_json(summary: &str) -> String {
    serde_json::json!({ "summary": summary }).to_string()
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: StructuredRequest) -> Result<String, GenerationError> {
        let name = request.schema.name;
        lock(&self.structured_requests).push(request);
        if let Some(delay) = self.structured_delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| {
                Err(GenerationError::Permanent {
                    message: format!("no mock response for `{name}`"),
                })
            })
    }

    async fn generate_stream(
        &self,
        request: StreamRequest,
    ) -> Result<FragmentStream, GenerationError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.stream_requests).push(request);
        if let Some(error) = self.stream_failure.clone() {
            return Err(error);
        }

        let mut items: Vec<Result<String, GenerationError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some((after, error)) = self.mid_stream_failure.clone() {
            items.truncate(after);
            items.push(Err(error));
        }

        let delay = self.fragment_delay;
        Ok(futures_util::stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
