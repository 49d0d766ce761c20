//! WAL record definition and wire codec

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Operations that can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Insert or replace a key
    Set,
    /// Remove a key
    Delete,
    /// Remove every key
    Clear,
}

impl Op {
    /// Wire name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Set => "SET",
            Op::Delete => "DELETE",
            Op::Clear => "CLEAR",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "SET" => Some(Op::Set),
            "DELETE" => Some(Op::Delete),
            "CLEAR" => Some(Op::Clear),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record line failed to decode
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("invalid operation: {0}")]
    Operation(String),

    #[error("invalid checksum field: {0}")]
    ChecksumField(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// A single WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unix timestamp in nanoseconds when the record was created
    pub timestamp: i64,

    /// The logged operation
    pub op: Op,

    /// Key (empty for CLEAR)
    pub key: String,

    /// Value (empty for DELETE and CLEAR)
    pub value: String,

    /// CRC32 over `timestamp|op|key|value` (unescaped)
    pub checksum: u32,
}

impl Record {
    /// Create a record stamped with the current time
    pub fn new(op: Op, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut record = Self {
            timestamp: unix_nanos(),
            op,
            key: key.into(),
            value: value.into(),
            checksum: 0,
        };
        record.checksum = record.compute_checksum();
        record
    }

    /// CRC32 of the canonical (unescaped) field string
    fn compute_checksum(&self) -> u32 {
        let data = format!(
            "{}|{}|{}|{}",
            self.timestamp, self.op, self.key, self.value
        );
        crc32fast::hash(data.as_bytes())
    }

    /// Check the stored checksum against the record contents
    pub fn validate(&self) -> Result<(), DecodeError> {
        let expected = self.compute_checksum();
        if self.checksum != expected {
            return Err(DecodeError::ChecksumMismatch {
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }

    /// Encode as one wire line, newline-terminated
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}\n",
            self.timestamp,
            self.op,
            escape(&self.key),
            escape(&self.value),
            self.checksum
        )
    }

    /// Decode a wire line (without requiring the trailing newline)
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }

        let fields = split_fields(line);
        if fields.len() != 5 {
            return Err(DecodeError::FieldCount(fields.len()));
        }

        let timestamp = fields[0]
            .parse::<i64>()
            .map_err(|_| DecodeError::Timestamp(fields[0].clone()))?;

        let op = Op::from_wire(&fields[1])
            .ok_or_else(|| DecodeError::Operation(fields[1].clone()))?;

        let key = unescape(&fields[2]);
        let value = unescape(&fields[3]);

        let checksum = fields[4]
            .parse::<u32>()
            .map_err(|_| DecodeError::ChecksumField(fields[4].clone()))?;

        let record = Self {
            timestamp,
            op,
            key,
            value,
            checksum,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Escape field separators and line terminators for safe storage
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse `escape` with a single left-to-right pass
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('|') => out.push('|'),
            Some('n') => out.push('\n'),
            // Unknown escape or trailing backslash: keep it verbatim
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split a record line on unescaped `|`, leaving escapes in the fields
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '|' => {
                fields.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trips() {
        for s in ["plain", "pipe|here", "back\\slash", "new\nline", "\\n", "", "a|b\\c\nd"] {
            assert_eq!(unescape(&escape(s)), s, "round trip failed for {s:?}");
        }
    }

    #[test]
    fn backslash_n_is_not_a_newline() {
        // A literal backslash followed by 'n' must survive the codec.
        let original = "\\n";
        let escaped = escape(original);
        assert_eq!(escaped, "\\\\n");
        assert_eq!(unescape(&escaped), original);
    }

    #[test]
    fn split_respects_escaped_pipes() {
        let fields = split_fields("1|SET|a\\|b|v|2");
        assert_eq!(fields, vec!["1", "SET", "a\\|b", "v", "2"]);
    }
}
