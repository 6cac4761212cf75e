//! Pulling structured verdicts out of free-form judge replies.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;

use crate::core::error::{Error, Result};

fn fenced_block() -> &'static Regex {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    FENCED.get_or_init(|| {
        RegexBuilder::new(r"```(?:json)?\s*(\{.*?\})\s*```")
            .dot_matches_new_line(true)
            .build()
            .expect("valid regex")
    })
}

/// Deserialize the JSON object in a judge reply.
///
/// Accepts a bare object, an object inside a ```json fence, or an object
/// surrounded by prose (first `{` to last `}`).
pub fn parse_judge_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(cap) = fenced_block().captures(trimmed)
        && let Ok(value) = serde_json::from_str(&cap[1])
    {
        return Ok(value);
    }

    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(Error::MalformedResponse(format!(
                "judge reply contains no JSON object: {}",
                preview(trimmed, 120)
            )));
        }
    };
    serde_json::from_str(candidate).map_err(|e| {
        Error::MalformedResponse(format!(
            "judge reply is not valid JSON ({e}): {}",
            preview(trimmed, 120)
        ))
    })
}

/// At most `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Verdicts arrive as 0/1, as booleans, or occasionally as "yes"/"no".
pub fn verdict_value(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|v| v >= 0.5),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" => Some(true),
            "0" | "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        verdict: u8,
    }

    #[test]
    fn parses_bare_object() {
        let reply: Reply = parse_judge_json(r#" {"verdict": 1} "#).unwrap();
        assert_eq!(reply, Reply { verdict: 1 });
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "Here you go:\n```json\n{\"verdict\": 0}\n```\nThanks";
        let reply: Reply = parse_judge_json(raw).unwrap();
        assert_eq!(reply.verdict, 0);
    }

    #[test]
    fn parses_object_wrapped_in_prose() {
        let raw = "Sure! {\"verdict\": 1} Let me know if you need more.";
        let reply: Reply = parse_judge_json(raw).unwrap();
        assert_eq!(reply.verdict, 1);
    }

    #[test]
    fn rejects_reply_without_object() {
        let err = parse_judge_json::<Reply>("I cannot answer that").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn verdicts_accept_common_encodings() {
        assert_eq!(verdict_value(&json!(1)), Some(true));
        assert_eq!(verdict_value(&json!(0)), Some(false));
        assert_eq!(verdict_value(&json!(true)), Some(true));
        assert_eq!(verdict_value(&json!("No")), Some(false));
        assert_eq!(verdict_value(&json!("maybe")), None);
        assert_eq!(verdict_value(&json!(null)), None);
    }
}
