//! JSON extraction from free-form LLM output.
//!
//! Models wrap JSON in code fences, prefix it with reasoning, or quote example
//! objects before the real answer. Extraction tries, in order: the whole
//! response, a ```json fence, any fence, then the largest balanced object in
//! the text, preferring later ones on ties.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::LlmError;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"```(json)?[^\n`]*\n?([\s\S]*?)```").expect("fence pattern is valid")
    })
}

/// Index of the delimiter closing the one at the start of `s`, skipping
/// string literals and escapes.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let open = s.chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_valid_json(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

/// Largest valid JSON object in `content`; later objects win ties.
fn largest_object(content: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    for (start, _) in content.match_indices('{') {
        let rest = &content[start..];
        let Some(end) = find_matching_brace(rest) else {
            continue;
        };
        let candidate = &rest[..=end];
        if is_valid_json(candidate) && best.is_none_or(|b| candidate.len() >= b.len()) {
            best = Some(candidate);
        }
    }
    best
}

/// Extracts the JSON document an LLM response carries, if any.
pub fn extract_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if (trimmed.starts_with('{') || trimmed.starts_with('[')) && is_valid_json(trimmed) {
        return Some(trimmed.to_string());
    }

    // ```json fences first, then any fence.
    let fences: Vec<_> = fence_pattern().captures_iter(content).collect();
    let tagged = fences.iter().filter(|c| c.get(1).is_some());
    let untagged = fences.iter().filter(|c| c.get(1).is_none());
    for caps in tagged.chain(untagged) {
        let Some(body) = caps.get(2).map(|m| m.as_str().trim()) else {
            continue;
        };
        if is_valid_json(body) {
            return Some(body.to_string());
        }
        if let Some(object) = largest_object(body) {
            return Some(object.to_string());
        }
    }

    largest_object(content).map(str::to_string)
}

/// Extracts and deserializes the JSON document in an LLM response.
///
/// # Errors
///
/// `LlmError::ParseError` when no JSON is found or it does not match `T`.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let json = extract_json(content).ok_or_else(|| {
        let preview: String = content.chars().take(200).collect();
        LlmError::ParseError(format!("no JSON found in response: {}", preview))
    })?;
    serde_json::from_str(&json)
        .map_err(|e| LlmError::ParseError(format!("unexpected JSON shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        probability: f64,
    }

    #[test]
    fn test_direct_json() {
        assert_eq!(
            extract_json(r#"  {"probability": 0.4} "#).as_deref(),
            Some(r#"{"probability": 0.4}"#)
        );
        assert_eq!(extract_json("[1, 2]").as_deref(), Some("[1, 2]"));
    }

    #[test]
    fn test_code_fences() {
        let content = "Sure:\n```json\n{\"probability\": 0.9}\n```\nDone.";
        assert_eq!(
            parse_json_response::<Probe>(content).unwrap(),
            Probe { probability: 0.9 }
        );

        let generic = "```\nnote {\"probability\": 0.1} end\n```";
        assert_eq!(
            parse_json_response::<Probe>(generic).unwrap().probability,
            0.1
        );
    }

    #[test]
    fn test_prefers_largest_later_object() {
        let content = r#"For example {"a": 1}. My answer: {"probability": 0.25, "why": {"k": "v"}}"#;
        assert_eq!(
            parse_json_response::<Probe>(content).unwrap().probability,
            0.25
        );
    }

    #[test]
    fn test_braces_inside_strings() {
        let s = r#"{"text": "a } inside \" quote {", "n": 1} trailing"#;
        let end = find_matching_brace(s).unwrap();
        assert_eq!(&s[..=end], r#"{"text": "a } inside \" quote {", "n": 1}"#);
        assert_eq!(find_matching_brace("[[1], 2] x"), Some(7));
        assert_eq!(find_matching_brace("{ unclosed"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_json_response::<Probe>("no json here"),
            Err(LlmError::ParseError(_))
        ));
        assert!(matches!(
            parse_json_response::<Probe>(r#"{"other": true}"#),
            Err(LlmError::ParseError(msg)) if msg.contains("unexpected JSON shape")
        ));
    }
}
