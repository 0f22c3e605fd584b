//! Transcription stage: prompt assembly and the fragment stream.

use crate::defaults;
use crate::error::GenerationError;
use crate::generation::{FragmentStream, MediaSource, StreamRequest, TextGenerator};
use futures_util::StreamExt;

/// Combine the user's standing instructions with the job's own.
///
/// Standard instructions come first, separated by a blank line. The speaker
/// and timestamp sentences are appended on their own lines.
pub fn build_instructions(
    standard: &str,
    job: &str,
    speaker_labels: bool,
    add_timestamps: bool,
) -> String {
    let mut instructions = if standard.is_empty() {
        job.to_string()
    } else {
        format!("{standard}\n\n{job}")
    };
    if speaker_labels {
        instructions.push('\n');
        instructions.push_str(defaults::SPEAKER_LABELS_INSTRUCTION);
    }
    if add_timestamps {
        instructions.push('\n');
        instructions.push_str(defaults::TIMESTAMPS_INSTRUCTION);
    }
    instructions
}

/// Prompt text sent alongside the audio.
pub fn build_prompt(subject: &str, instructions: &str, reference_names: &[String]) -> String {
    let mut prompt =
        format!("Transcribe the following audio. Subject: {subject}. Instructions: {instructions}");
    if !reference_names.is_empty() {
        prompt.push_str("\nReference material provided by the user: ");
        prompt.push_str(&reference_names.join(", "));
    }
    prompt
}

/// Start the streaming transcription call.
///
/// Empty fragments are filtered out; the rest are passed through in order.
pub async fn stream_transcription(
    generator: &dyn TextGenerator,
    model: &str,
    prompt: String,
    media: MediaSource,
) -> Result<FragmentStream, GenerationError> {
    let request = StreamRequest {
        model: model.to_string(),
        prompt,
        media: Some(media),
    };
    tracing::debug!(model, backend = generator.name(), "starting transcription stream");
    let stream = generator.generate_stream(request).await?;
    Ok(stream
        .filter(|item| {
            let keep = !matches!(item, Ok(text) if text.is_empty());
            async move { keep }
        })
        .boxed())
}
