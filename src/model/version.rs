//! Version tokens and version records

use super::ContentHash;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed version token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{0}': expected LATEST, OLDEST or a positive integer")]
pub struct ParseVersionError(pub String);

/// Position in a key's history
///
/// Histories are newest-first, so `Latest` is position 0 and `Oldest` is the
/// tail. Externally versions are numbered from 1; `Position` holds the
/// 0-indexed internal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionId {
    Latest,
    Oldest,
    Position(u32),
}

impl VersionId {
    /// Parse a token received on the wire
    pub fn parse(raw: &[u8]) -> Result<Self, ParseVersionError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ParseVersionError(String::from_utf8_lossy(raw).into_owned()))?;
        text.parse()
    }

    /// Index into the version list; negative values count from the tail
    pub fn list_index(&self) -> i64 {
        match self {
            VersionId::Latest => 0,
            VersionId::Oldest => -1,
            VersionId::Position(p) => i64::from(*p),
        }
    }
}

impl FromStr for VersionId {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionId::Latest);
        }
        if s.eq_ignore_ascii_case("oldest") {
            return Ok(VersionId::Oldest);
        }
        // u32::from_str accepts a leading '+', which is not a valid token
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseVersionError(s.to_string()));
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(VersionId::Position(n - 1)),
            _ => Err(ParseVersionError(s.to_string())),
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionId::Latest => write!(f, "latest"),
            VersionId::Oldest => write!(f, "oldest"),
            VersionId::Position(p) => write!(f, "{}", u64::from(*p) + 1),
        }
    }
}

/// One entry of a key's history, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// 1-indexed version number, 1 being the newest
    pub number: u32,
    pub hash: ContentHash,
    /// `None` when the stored entry carries no write time
    pub created_at: Option<DateTime<Utc>>,
    pub latest: bool,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.number, self.hash)?;
        match self.created_at {
            Some(at) => write!(f, "{}", at.to_rfc3339_opts(SecondsFormat::Millis, true))?,
            None => write!(f, "unknown")?,
        }
        if self.latest {
            write!(f, " latest")?;
        }
        Ok(())
    }
}
