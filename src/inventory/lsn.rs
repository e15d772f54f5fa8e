//! Replication positions
//!
//! PostgreSQL reports WAL positions as two hex words separated by a slash
//! (`16/B374D848`). The high word is the log id and the low word the byte
//! offset, so the pair maps directly onto a 64-bit byte position.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A replication position in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

/// Error returned for text that is not a replication position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsnParseError(pub String);

impl fmt::Display for LsnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid replication position: '{}'", self.0)
    }
}

impl std::error::Error for LsnParseError {}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Fa-f0-9/]").expect("static pattern"))
}

impl Lsn {
    /// Parse remote output, discarding anything that is not a hex digit or
    /// the separator. Command output carries trailing newlines and may carry
    /// stray characters.
    pub fn parse_output(raw: &str) -> Result<Self, LsnParseError> {
        let cleaned = unsafe_chars().replace_all(raw, "");
        cleaned.parse()
    }

    /// Bytes between this position and a later one; zero when `later` is behind.
    pub fn lag_behind(self, later: Lsn) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl FromStr for Lsn {
    type Err = LsnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| LsnParseError(s.to_string()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| LsnParseError(s.to_string()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| LsnParseError(s.to_string()))?;
        Ok(Lsn(((hi as u64) << 32) | lo as u64))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let lsn: Lsn = "16/B374D848".parse().unwrap();
        assert_eq!(lsn.0, (0x16u64 << 32) | 0xB374_D848);
        assert_eq!(lsn.to_string(), "16/B374D848");
    }

    #[test]
    fn test_parse_output_strips_noise() {
        let lsn = Lsn::parse_output("0/3000060\n").unwrap();
        assert_eq!(lsn, Lsn(0x0300_0060));

        let lsn = Lsn::parse_output(" 0/30'; 00060 ").unwrap();
        assert_eq!(lsn, Lsn(0x0300_0060));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("nonsense".parse::<Lsn>().is_err());
        assert!(Lsn::parse_output("").is_err());
    }

    #[test]
    fn test_lag() {
        let replica: Lsn = "0/1000".parse().unwrap();
        let primary: Lsn = "0/1800".parse().unwrap();
        assert_eq!(replica.lag_behind(primary), 0x800);
        assert_eq!(primary.lag_behind(replica), 0);
    }

    #[test]
    fn test_serde_as_text() {
        let json = serde_json::to_string(&Lsn(0x1_0000_0010)).unwrap();
        assert_eq!(json, "\"1/10\"");
        let back: Lsn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Lsn(0x1_0000_0010));
    }
}
