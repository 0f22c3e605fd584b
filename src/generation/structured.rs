//! Validation of structured model output.

use crate::error::GenerationError;
use crate::generation::ResponseSchema;
use serde::de::DeserializeOwned;

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse `raw` as a JSON object with every field of `schema` present as a string,
/// then deserialize it into `T`.
pub fn parse_structured<T: DeserializeOwned>(
    raw: &str,
    schema: &ResponseSchema,
) -> Result<T, GenerationError> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed {
            message: format!("{} response is not valid JSON: {e}", schema.name),
        })?;

    let object = value.as_object().ok_or_else(|| GenerationError::Malformed {
        message: format!("{} response is not a JSON object", schema.name),
    })?;

    for (field, _) in schema.fields {
        match object.get(*field) {
            Some(serde_json::Value::String(_)) => {}
            Some(_) => {
                return Err(GenerationError::Malformed {
                    message: format!("{} field `{field}` is not a string", schema.name),
                });
            }
            None => {
                return Err(GenerationError::Malformed {
                    message: format!("{} response is missing `{field}`", schema.name),
                });
            }
        }
    }

    serde_json::from_value(value).map_err(|e| GenerationError::Malformed {
        message: format!("{} response has an unexpected shape: {e}", schema.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    static PAIR: ResponseSchema = ResponseSchema {
        name: "pair",
        fields: &[("left", "left side"), ("right", "right side")],
    };

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        left: String,
        right: String,
    }

    #[test]
    fn parses_plain_json() {
        let pair: Pair = parse_structured(r#"{"left":"a","right":"b"}"#, &PAIR).unwrap();
        assert_eq!(
            pair,
            Pair {
                left: "a".into(),
                right: "b".into()
            }
        );
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"left\":\"a\",\"right\":\"b\"}\n```";
        let pair: Pair = parse_structured(raw, &PAIR).unwrap();
        assert_eq!(pair.right, "b");
    }

    #[test]
    fn strip_code_fence_leaves_plain_text() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn raw_text_is_malformed() {
        let result: Result<Pair, _> = parse_structured("Here is your corrected text", &PAIR);
        assert!(matches!(result, Err(GenerationError::Malformed { .. })));
    }

    #[test]
    fn missing_field_is_malformed() {
        let result: Result<Pair, _> = parse_structured(r#"{"left":"a"}"#, &PAIR);
        match result {
            Err(GenerationError::Malformed { message }) => assert!(message.contains("right")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn non_string_field_is_malformed() {
        let result: Result<Pair, _> = parse_structured(r#"{"left":"a","right":3}"#, &PAIR);
        assert!(matches!(result, Err(GenerationError::Malformed { .. })));
    }

    #[test]
    fn array_is_malformed() {
        let result: Result<Pair, _> = parse_structured("[]", &PAIR);
        assert!(matches!(result, Err(GenerationError::Malformed { .. })));
    }
}
