//! Token-based date formats for rotated artifact names.
//!
//! Formats use moment-style tokens so existing configurations keep working:
//!
//! | token  | output            |
//! |--------|-------------------|
//! | `YYYY` | 4-digit year      |
//! | `YY`   | 2-digit year      |
//! | `MM`/`M` | month (padded / plain) |
//! | `DD`/`D` | day of month    |
//! | `HH`/`H` | hour, 24h       |
//! | `mm`/`m` | minute          |
//! | `ss`/`s` | second          |
//!
//! Text inside `[...]` is copied verbatim; any other character is copied too.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_DATE_FORMAT: &str = "YYYYMMDD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Year4,
    Year2,
    Month2,
    Month,
    Day2,
    Day,
    Hour2,
    Hour,
    Minute2,
    Minute,
    Second2,
    Second,
}

// Longest tokens first so `YYYY` wins over `YY`.
const TOKENS: &[(&str, Token)] = &[
    ("YYYY", Token::Year4),
    ("YY", Token::Year2),
    ("MM", Token::Month2),
    ("M", Token::Month),
    ("DD", Token::Day2),
    ("D", Token::Day),
    ("HH", Token::Hour2),
    ("H", Token::Hour),
    ("mm", Token::Minute2),
    ("m", Token::Minute),
    ("ss", Token::Second2),
    ("s", Token::Second),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Token(Token),
    Literal(String),
}

/// A parsed date format.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateFormat {
    raw: String,
    parts: Vec<Part>,
}

impl DateFormat {
    /// Parse a format string. Fails on an unclosed `[` or an empty format.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDateFormat {
            format: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.trim().is_empty() {
            return Err(invalid("format is empty"));
        }

        let mut parts = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                push_literal(&mut parts, &after[..end]);
                rest = &after[end + 1..];
                continue;
            }
            if let Some((text, token)) = TOKENS.iter().find(|(text, _)| rest.starts_with(text)) {
                parts.push(Part::Token(*token));
                rest = &rest[text.len()..];
                continue;
            }
            let ch = rest.chars().next().unwrap_or_default();
            push_literal(&mut parts, &rest[..ch.len_utf8()]);
            rest = &rest[ch.len_utf8()..];
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render `at` with this format.
    pub fn render<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Token(token) => out.push_str(&render_token(*token, at)),
            }
        }
        out
    }
}

fn push_literal(parts: &mut Vec<Part>, text: &str) {
    if let Some(Part::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(Part::Literal(text.to_string()));
    }
}

fn render_token<Tz: TimeZone>(token: Token, at: &DateTime<Tz>) -> String {
    match token {
        Token::Year4 => format!("{:04}", at.year()),
        Token::Year2 => format!("{:02}", at.year().rem_euclid(100)),
        Token::Month2 => format!("{:02}", at.month()),
        Token::Month => at.month().to_string(),
        Token::Day2 => format!("{:02}", at.day()),
        Token::Day => at.day().to_string(),
        Token::Hour2 => format!("{:02}", at.hour()),
        Token::Hour => at.hour().to_string(),
        Token::Minute2 => format!("{:02}", at.minute()),
        Token::Minute => at.minute().to_string(),
        Token::Second2 => format!("{:02}", at.second()),
        Token::Second => at.second().to_string(),
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self {
            raw: DEFAULT_DATE_FORMAT.to_string(),
            parts: vec![
                Part::Token(Token::Year4),
                Part::Token(Token::Month2),
                Part::Token(Token::Day2),
            ],
        }
    }
}

impl fmt::Debug for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DateFormat").field(&self.raw).finish()
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl TryFrom<String> for DateFormat {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<DateFormat> for String {
    fn from(format: DateFormat) -> Self {
        format.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 4).single().expect("valid date")
    }

    #[rstest]
    #[case("YYYYMMDD", "20240307")]
    #[case("YYYY-MM-DD", "2024-03-07")]
    #[case("YY.M.D", "24.3.7")]
    #[case("YYYYMMDD-HHmmss", "20240307-090504")]
    #[case("H:m:s", "9:5:4")]
    #[case("[week]-YYYY", "week-2024")]
    #[case("YYYY[MM]", "2024MM")]
    fn renders_tokens(#[case] format: &str, #[case] expected: &str) {
        let parsed = DateFormat::parse(format).expect("parse");
        assert_eq!(parsed.render(&at()), expected);
    }

    #[test]
    fn default_matches_default_constant() {
        let parsed = DateFormat::parse(DEFAULT_DATE_FORMAT).expect("parse");
        assert_eq!(parsed, DateFormat::default());
    }

    #[test]
    fn unclosed_bracket_is_rejected() {
        let err = DateFormat::parse("YYYY[oops").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDateFormat { .. }), "got: {err}");
    }

    #[test]
    fn empty_format_is_rejected() {
        assert!(DateFormat::parse("  ").is_err());
    }

    #[test]
    fn serde_uses_raw_string() {
        let parsed: DateFormat = serde_yaml::from_str("YYYY-MM").expect("parse");
        assert_eq!(parsed.as_str(), "YYYY-MM");
        let yaml = serde_yaml::to_string(&parsed).expect("serialize");
        assert_eq!(yaml.trim(), "YYYY-MM");
    }
}
