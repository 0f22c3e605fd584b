//! Summary stage.

use crate::error::GenerationError;
use crate::generation::structured::parse_structured;
use crate::generation::{ResponseSchema, StructuredRequest, TextGenerator};
use serde::{Deserialize, Serialize};

pub static SUMMARY_SCHEMA: ResponseSchema = ResponseSchema {
    name: "summary",
    fields: &[("summary", "A concise summary of the transcribed text.")],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub summary: String,
}

pub fn build_summary_prompt(transcription: &str) -> String {
    format!(
        "You are an expert summarizer. Provide a concise summary of the following \
         transcribed text.\n\n\
         Respond with a JSON object with the string field `summary`. Do not include \
         any other text or markdown fences.\n\n\
         Transcription:\n{transcription}\n"
    )
}

/// Summarize the best available transcription (corrected if reviewed, else raw).
pub async fn summarize_transcription(
    generator: &dyn TextGenerator,
    model: &str,
    transcription: &str,
) -> Result<SummaryOutput, GenerationError> {
    let request = StructuredRequest {
        model: model.to_string(),
        prompt: build_summary_prompt(transcription),
        schema: &SUMMARY_SCHEMA,
    };
    let raw = generator.generate(request).await?;
    parse_structured(&raw, &SUMMARY_SCHEMA)
}
