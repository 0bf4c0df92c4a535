use serde_json::Value;

/// Strip a markdown code fence (with or without an info string such as
/// `json`) from a model answer. Either fence marker may be missing, which is
/// what a truncated answer looks like.
pub fn strip_code_fence(answer: &str) -> &str {
    let mut text = answer.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string up to the end of the opening line.
        text = match rest.find('\n') {
            Some(nl) if rest[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    text.trim().trim_end_matches("```").trim()
}

fn empty() -> Value {
    Value::Array(Vec::new())
}

/// Parse the JSON payload out of a free-form model answer.
///
/// Never fails: anything unrecoverable becomes an empty array.
///
/// 1. Strip a surrounding code fence.
/// 2. Text that opens an array but does not close it is truncated output. Cut
///    after the last `}`, close the array and parse that; whatever object was
///    being written when the output stopped is discarded.
/// 3. Otherwise parse the text as is.
pub fn recover_json(answer: &str) -> Value {
    let text = strip_code_fence(answer);

    if text.starts_with('[') && !text.ends_with(']') {
        let Some(last) = text.rfind('}') else {
            tracing::warn!(raw = text, "Truncated array answer has no complete object");
            return empty();
        };
        let candidate = format!("{}]", &text[..=last]);
        return match serde_json::from_str::<Vec<Value>>(&candidate) {
            Ok(items) => {
                tracing::info!(recovered = items.len(), "Recovered truncated array answer");
                Value::Array(items)
            }
            Err(e) => {
                tracing::warn!(error = %e, raw = text, "Could not recover truncated array answer");
                empty()
            }
        };
    }

    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, raw = text, "Model answer is not valid JSON");
            empty()
        }
    }
}
