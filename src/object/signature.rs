//! Author/committer signature lines as they appear in commit and annotated
//! tag objects: `<role> <name> <<email>> <epoch-seconds> <+/-HHMM>`.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use chrono::{FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureRole {
    Author,
    Committer,
    Tagger,
}

impl SignatureRole {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            SignatureRole::Author => b"author",
            SignatureRole::Committer => b"committer",
            SignatureRole::Tagger => b"tagger",
        }
    }
}

/// One `author`/`committer`/`tagger` line: a name, an email, and a time
/// with its UTC offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub role: SignatureRole,
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Offset in minutes east of UTC, as written in the `+HHMM`/`-HHMM`
    /// field (can be negative).
    pub offset_minutes: i32,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} <{}> {} {}",
            String::from_utf8_lossy(self.role.as_bytes()),
            self.name,
            self.email,
            self.timestamp,
            format_offset(self.offset_minutes)
        )
    }
}

impl Signature {
    /// Parse a single signature line, e.g.
    /// `author A U Thor <author@example.com> 1717000000 +0800`.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, GitError> {
        let text = data.trim_end();
        let role_end = text
            .find_byte(b' ')
            .ok_or_else(|| GitError::InvalidSignature("missing role".to_string()))?;
        let role = match &text[..role_end] {
            b"author" => SignatureRole::Author,
            b"committer" => SignatureRole::Committer,
            b"tagger" => SignatureRole::Tagger,
            other => {
                return Err(GitError::InvalidSignature(format!(
                    "unknown signature role `{}`",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        let rest = &text[role_end + 1..];

        let email_start = rest
            .find_byte(b'<')
            .ok_or_else(|| GitError::InvalidSignature("missing email".to_string()))?;
        let email_end = rest
            .find_byte(b'>')
            .ok_or_else(|| GitError::InvalidSignature("unterminated email".to_string()))?;
        if email_end < email_start {
            return Err(GitError::InvalidSignature("malformed email field".to_string()));
        }
        let name = String::from_utf8_lossy(rest[..email_start].trim_end())
            .trim_end()
            .to_string();
        let email = String::from_utf8_lossy(&rest[email_start + 1..email_end]).to_string();

        let tail = rest[email_end + 1..].trim_start();
        let mut parts = tail.split(|&b| b == b' ').filter(|p| !p.is_empty());
        let timestamp: i64 = parts
            .next()
            .and_then(|p| std::str::from_utf8(p).ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GitError::InvalidSignature("missing timestamp".to_string()))?;
        let offset_raw = parts
            .next()
            .and_then(|p| std::str::from_utf8(p).ok())
            .ok_or_else(|| GitError::InvalidSignature("missing offset".to_string()))?;
        let offset_minutes = parse_offset(offset_raw)?;

        Ok(Signature {
            role,
            name,
            email,
            timestamp,
            offset_minutes,
        })
    }

    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.to_string().into_bytes())
    }

    /// The commit/tag time as a UTC-normalized `DateTime`, preserving the
    /// author's original offset for display.
    pub fn when(&self) -> chrono::DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
            .with_timezone(&offset)
    }
}

fn format_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 60, abs % 60)
}

fn parse_offset(raw: &str) -> Result<i32, GitError> {
    if raw.len() != 5 || !(raw.starts_with('+') || raw.starts_with('-')) {
        return Err(GitError::InvalidSignature(format!(
            "malformed offset `{raw}`"
        )));
    }
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let hh: i32 = raw[1..3]
        .parse()
        .map_err(|_| GitError::InvalidSignature(format!("malformed offset `{raw}`")))?;
    let mm: i32 = raw[3..5]
        .parse()
        .map_err(|_| GitError::InvalidSignature(format!("malformed offset `{raw}`")))?;
    Ok(sign * (hh * 60 + mm))
}

impl FromStr for Signature {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::from_data(s.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_author_line() {
        let sig = Signature::from_data(
            b"author A U Thor <author@example.com> 1717000000 +0800".to_vec(),
        )
        .unwrap();
        assert_eq!(sig.name, "A U Thor");
        assert_eq!(sig.email, "author@example.com");
        assert_eq!(sig.timestamp, 1717000000);
        assert_eq!(sig.offset_minutes, 8 * 60);
    }

    #[test]
    fn round_trips_through_display() {
        let line = "committer Jane Doe <jane@example.com> 1000000 -0530";
        let sig = Signature::from_data(line.as_bytes().to_vec()).unwrap();
        assert_eq!(sig.to_string(), line);
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(Signature::from_data(b"ghost A <a@b.com> 1 +0000".to_vec()).is_err());
    }
}
