//! JSON decoding with enough context to debug upstream format drift.

use std::fmt;

/// A decode failure pinned to a JSON path and a snippet of the offending line.
#[derive(Debug)]
pub struct JsonDecodeError {
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub snippet: String,
}

impl fmt::Display for JsonDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() && self.path != "." {
            write!(f, "at path '{}': ", self.path)?;
        }
        write!(
            f,
            "{} (line {} col {})\n{}",
            self.message, self.line, self.column, self.snippet
        )
    }
}

impl std::error::Error for JsonDecodeError {}

/// Decode `body`, attaching the serde path and a snippet around the error.
pub fn decode_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, JsonDecodeError> {
    let de = &mut serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());
        let raw = inner.to_string();
        let suffix = format!(" at line {line} column {column}");
        let message = describe(raw.strip_suffix(&suffix).unwrap_or(&raw));
        let text = String::from_utf8_lossy(body);

        JsonDecodeError {
            path,
            line,
            column,
            message,
            snippet: snippet(&text, line, column, 24),
        }
    })
}

/// Rewrite serde's "invalid type: X, expected Y" into "expected Y, got X".
fn describe(message: &str) -> String {
    let Some(rest) = message.strip_prefix("invalid type: ") else {
        return message.to_string();
    };
    match rest.split_once(", expected ") {
        Some((actual, expected)) => format!("expected {}, got {}", expected.trim(), actual),
        None => message.to_string(),
    }
}

fn snippet(body: &str, line: usize, column: usize, width: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let idx = column.saturating_sub(1).min(target.len());
    let start = idx.saturating_sub(width / 2);
    let end = (idx + width / 2).min(target.len());
    let slice: String = target[start..end].iter().collect();
    let marker = format!("{}^", " ".repeat(idx - start));

    format!("...{slice}...\n   {marker}")
}
