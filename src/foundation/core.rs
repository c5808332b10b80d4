use crate::foundation::error::{FrameplotError, FrameplotResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub use kurbo::{PathEl, Point};

/// Identifier of one sampled video frame. Key order is playback order.
///
/// All-digit keys are frame indices and order by numeric value whatever their padding
/// (`"2" < "10"`, `"002" < "010"`). They sort before any other key. Other keys order lexically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameKey(pub String);

impl Ord for FrameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.index_digits(), other.index_digits()) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for FrameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FrameKey {
    /// Create a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Significant digits of an all-digit key (`"007"` -> `"7"`, `"000"` -> `""`).
    fn index_digits(&self) -> Option<&str> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(self.0.trim_start_matches('0'))
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for FrameKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Equation color as a normalized `#rrggbb` / `#rrggbbaa` string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    /// Opaque black, the color every equation gets unless configured otherwise.
    pub fn black() -> Self {
        Self("#000000".to_owned())
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (case-insensitive, `#` optional).
    pub fn parse(s: &str) -> FrameplotResult<Self> {
        let s = s.trim();
        let digits = s.strip_prefix('#').unwrap_or(s);
        if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FrameplotError::validation(format!(
                "color \"{s}\" must be #RRGGBB or #RRGGBBAA (case-insensitive)"
            )));
        }
        Ok(Self(format!("#{}", digits.to_ascii_lowercase())))
    }

    /// Borrow the normalized text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self::black()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HexColor {
    type Error = FrameplotError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> Self {
        c.0
    }
}

/// Format a coordinate for formula text.
///
/// Never uses exponent notation and never emits `-0`. With `precision`, the value is rounded to
/// that many decimals and trailing zeros are dropped.
pub fn fmt_coord(v: f64, precision: Option<u8>) -> String {
    let s = match precision {
        Some(p) => trim_fraction(format!("{:.*}", usize::from(p), v)),
        // `Display` for f64 is the shortest round-trip form without an exponent.
        None => format!("{v}"),
    };
    if s == "-0" { "0".to_owned() } else { s }
}

fn trim_fraction(mut s: String) -> String {
    if s.contains('.') {
        let keep = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(keep);
    }
    s
}
