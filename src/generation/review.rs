//! Review stage: correct a finished transcription and describe the edits.

use crate::config::ReviewSettings;
use crate::error::GenerationError;
use crate::generation::structured::parse_structured;
use crate::generation::{ResponseSchema, StructuredRequest, TextGenerator};
use serde::{Deserialize, Serialize};

pub static REVIEW_SCHEMA: ResponseSchema = ResponseSchema {
    name: "review",
    fields: &[
        (
            "correctedTranscription",
            "The corrected transcription after review.",
        ),
        (
            "changelog",
            "A summary of the changes made during the review.",
        ),
    ],
};

/// Corrected text plus a changelog, produced in one round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutput {
    pub corrected_transcription: String,
    pub changelog: String,
}

pub fn build_review_prompt(transcription: &str, settings: &ReviewSettings) -> String {
    let mut steps = vec!["Correct any spelling and grammatical errors.".to_string()];
    if !settings.correct_spelling {
        steps[0] = "Correct grammatical errors only; keep the original spelling.".to_string();
    }
    if settings.analyze_diarization {
        steps.push("Ensure the speaker labels are accurate and consistent.".to_string());
    }
    if !settings.custom_review_prompt.trim().is_empty() {
        steps.push(format!(
            "Follow these additional review instructions: {}",
            settings.custom_review_prompt.trim()
        ));
    }
    let steps = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an expert reviewer of transcriptions.\n\
         Given the original transcription, provide a corrected transcription and a \
         changelog summarizing the edits.\n\n\
         Instructions:\n{steps}\n\n\
         Respond with a JSON object with the string fields `correctedTranscription` \
         and `changelog`. Do not wrap it in markdown fences.\n\n\
         Original transcription:\n{transcription}\n"
    )
}

/// Run the review call and validate its shape.
pub async fn review_transcription(
    generator: &dyn TextGenerator,
    model: &str,
    transcription: &str,
    settings: &ReviewSettings,
) -> Result<ReviewOutput, GenerationError> {
    let request = StructuredRequest {
        model: model.to_string(),
        prompt: build_review_prompt(transcription, settings),
        schema: &REVIEW_SCHEMA,
    };
    let raw = generator.generate(request).await?;
    parse_structured(&raw, &REVIEW_SCHEMA)
}
