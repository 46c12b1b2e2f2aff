//! Wire records of the `/api/chat` response body.
//!
//! Each line is `<prefix>:<json>`. The JSON `type` tag decides the meaning;
//! the prefix only mirrors it for readability on the wire.
//!
//! ```text
//! 0:{"type":"textDelta","textDelta":"Hel"}
//! 0:{"type":"textDelta","textDelta":"lo"}
//! d:{"type":"finish","finishReason":"stop"}
//! ```

use serde::{Deserialize, Serialize};

pub const TEXT_PREFIX: &str = "0";
pub const ERROR_PREFIX: &str = "3";
pub const FINISH_PREFIX: &str = "d";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Record {
    #[serde(rename_all = "camelCase")]
    TextDelta { text_delta: String },
    Error { error: String },
    #[serde(rename_all = "camelCase")]
    Finish { finish_reason: String },
    /// Any record type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl Record {
    pub fn text(fragment: impl Into<String>) -> Self {
        Record::TextDelta {
            text_delta: fragment.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Record::Error {
            error: message.into(),
        }
    }

    pub fn finish() -> Self {
        Record::Finish {
            finish_reason: "stop".to_string(),
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Record::TextDelta { .. } | Record::Unknown => TEXT_PREFIX,
            Record::Error { .. } => ERROR_PREFIX,
            Record::Finish { .. } => FINISH_PREFIX,
        }
    }

    /// Serializes the record as one newline-terminated line.
    pub fn encode(&self) -> String {
        // Serializing a tagged enum of strings cannot fail.
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("{}:{}\n", self.prefix(), json)
    }

    /// Parses one line. `None` for blank lines, lines without a prefix and
    /// lines whose payload is not a JSON object with a `type` tag.
    pub fn parse(line: &str) -> Option<Record> {
        let (prefix, payload) = line.split_once(':')?;
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return None;
        }
        serde_json::from_str(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_wire_shape() {
        assert_eq!(
            Record::text("Hi").encode(),
            "0:{\"type\":\"textDelta\",\"textDelta\":\"Hi\"}\n"
        );
    }

    #[test]
    fn test_finish_and_error_wire_shape() {
        assert_eq!(
            Record::finish().encode(),
            "d:{\"type\":\"finish\",\"finishReason\":\"stop\"}\n"
        );
        assert_eq!(
            Record::error("boom").encode(),
            "3:{\"type\":\"error\",\"error\":\"boom\"}\n"
        );
    }

    #[test]
    fn test_parse_text_delta() {
        let record = Record::parse(r#"0:{"type":"textDelta","textDelta":"a:b"}"#);
        assert_eq!(record, Some(Record::text("a:b")));
    }

    #[test]
    fn test_type_tag_wins_over_prefix() {
        let record = Record::parse(r#"9:{"type":"textDelta","textDelta":"x"}"#);
        assert_eq!(record, Some(Record::text("x")));
    }

    #[test]
    fn test_unknown_type_is_unknown() {
        let record = Record::parse(r#"e:{"type":"stepFinish","usage":{}}"#);
        assert_eq!(record, Some(Record::Unknown));
    }

    #[test]
    fn test_malformed_lines_are_none() {
        assert_eq!(Record::parse(""), None);
        assert_eq!(Record::parse("no prefix here"), None);
        assert_eq!(Record::parse(":{\"type\":\"finish\"}"), None);
        assert_eq!(Record::parse("0:{not json"), None);
        assert_eq!(Record::parse("0:\"bare string\""), None);
        assert_eq!(Record::parse("0:{\"textDelta\":\"untagged\"}"), None);
    }

    #[test]
    fn test_text_fragment_with_newline_stays_on_one_line() {
        let line = Record::text("line1\nline2").encode();
        assert_eq!(line.matches('\n').count(), 1);
        let parsed = Record::parse(line.trim_end_matches('\n'));
        assert_eq!(parsed, Some(Record::text("line1\nline2")));
    }
}
