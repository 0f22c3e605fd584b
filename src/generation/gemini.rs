//! Gemini backend over the Generative Language REST API.
//!
//! Streaming calls use `streamGenerateContent?alt=sse`; structured calls use
//! `generateContent` with a JSON response schema.

use crate::defaults;
use crate::error::GenerationError;
use crate::generation::{
    FragmentStream, MediaSource, ResponseSchema, StreamRequest, StructuredRequest, TextGenerator,
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

fn build_request(prompt: String, media: Option<MediaSource>) -> GeminiRequest {
    let mut parts = vec![Part::Text { text: prompt }];
    match media {
        Some(MediaSource::Inline { mime_type, data }) => parts.push(Part::InlineData {
            inline_data: InlineData { mime_type, data },
        }),
        Some(MediaSource::Url { mime_type, url }) => parts.push(Part::FileData {
            file_data: FileData {
                mime_type,
                file_uri: url,
            },
        }),
        None => {}
    }
    GeminiRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: None,
    }
}

/// OpenAPI-subset schema in the form `generateContent` expects.
fn response_schema(schema: &ResponseSchema) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = schema
        .fields
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                serde_json::json!({ "type": "STRING", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = schema.fields.iter().map(|(name, _)| *name).collect();
    serde_json::json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

/// Map a non-success HTTP status to a generation error.
fn classify_status(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        503 => GenerationError::Overloaded { message },
        429 => GenerationError::RateLimited {
            message,
            retry_after,
        },
        _ => GenerationError::Permanent {
            message: format!("Gemini request failed with status {status}: {message}"),
        },
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Overloaded {
            message: format!("Gemini request timed out: {e}"),
        }
    } else if e.is_connect() {
        GenerationError::Overloaded {
            message: format!("could not reach Gemini: {e}"),
        }
    } else {
        GenerationError::Permanent {
            message: format!("Gemini request failed: {e}"),
        }
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Concatenated text of the first candidate.
fn response_text(response: GeminiResponse) -> Result<String, GenerationError> {
    if let Some(error) = response.error {
        return Err(classify_status(
            error.code.unwrap_or(500),
            error.message.as_deref().unwrap_or("unknown error"),
            None,
        ));
    }
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Permanent {
            message: format!("Gemini blocked the request: {reason}"),
        });
    }
    Ok(response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

/// Splits a server-sent-events body into `data:` payloads.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across chunks survive.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: String,
}

impl SseDecoder {
    /// Feed a chunk, returning every event completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            self.take_line(line, &mut events);
        }
        events
    }

    /// Flush whatever is left once the body ends.
    fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            self.take_line(rest.trim_end_matches(['\n', '\r']), &mut events);
        }
        self.take_line("", &mut events);
        events
    }

    fn take_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(std::mem::take(&mut self.data));
            }
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }
}

/// Text carried by one SSE payload. `Ok("")` for events without text.
fn event_text(payload: &str) -> Result<String, GenerationError> {
    let response: GeminiResponse =
        serde_json::from_str(payload).map_err(|e| GenerationError::Malformed {
            message: format!("invalid stream event: {e}"),
        })?;
    response_text(response)
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, GenerationError>>,
    done: bool,
}

impl<S> SseState<S> {
    fn queue(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            let item = event_text(&payload);
            let failed = item.is_err();
            self.pending.push_back(item);
            if failed {
                self.done = true;
                break;
            }
        }
    }
}

fn fragment_stream<S, B>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(chunk.as_ref());
                    state.queue(payloads);
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(transport_error(e)));
                }
                None => {
                    let payloads = state.decoder.finish();
                    state.queue(payloads);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

/// Client for the Generative Language API
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GenerationError::Permanent {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post(
        &self,
        url: String,
        body: &GeminiRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, GenerationError> {
        let mut request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Gemini request rejected");
        Err(classify_status(status.as_u16(), &text, retry_after))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: StructuredRequest) -> Result<String, GenerationError> {
        let mut body = build_request(request.prompt, None);
        body.generation_config = Some(GenerationConfig {
            response_mime_type: "application/json",
            response_schema: response_schema(request.schema),
        });
        let url = self.endpoint(&request.model, "generateContent");
        let timeout = Duration::from_secs(defaults::GENERATE_TIMEOUT_SECS);
        let response = self.post(url, &body, Some(timeout)).await?;

        let parsed: GeminiResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::Malformed {
                    message: format!("invalid Gemini response: {e}"),
                })?;
        response_text(parsed)
    }

    async fn generate_stream(
        &self,
        request: StreamRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let body = build_request(request.prompt, request.media);
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&request.model, "streamGenerateContent")
        );
        let response = self.post(url, &body, None).await?;
        tracing::debug!(model = %request.model, "transcription stream opened");
        Ok(fragment_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
