use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dotted release number such as `3.11.4` or `23.0`. Pre-release and local
/// suffixes are ignored and trailing zeros do not affect comparison.
#[derive(Debug, Clone)]
pub struct PyVersion {
    text: String,
    parts: Vec<u64>,
}

impl PyVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let mut parts = Vec::new();
        for piece in s.split('.') {
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse::<u64>().ok()?);
            if digits.len() != piece.len() {
                break;
            }
        }
        if parts.is_empty() {
            return None;
        }
        let text = parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Some(Self { text, parts })
    }

    /// Builds a version from known numeric components.
    pub fn new(parts: &[u64]) -> Self {
        let text = parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Self::parse(&text).unwrap_or_else(|| Self {
            text: "0".to_string(),
            parts: vec![0],
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for PyVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for PyVersion {}

impl PartialOrd for PyVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PyVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl fmt::Display for PyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::str::FromStr for PyVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PyVersion::parse(s).ok_or_else(|| format!("バージョンが不正です: {s}"))
    }
}

impl Serialize for PyVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for PyVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `Python 3.11.4` (older interpreters print it on stderr).
pub fn parse_python_version(output: &str) -> Option<PyVersion> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Python")?;
        PyVersion::parse(rest)
    })
}

/// `pip 23.0.1 from /usr/lib/python3/dist-packages/pip (python 3.11)`
pub fn parse_pip_version(output: &str) -> Option<PyVersion> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        if tokens.next()? != "pip" {
            return None;
        }
        PyVersion::parse(tokens.next()?)
    })
}

/// The `Version:` field of `pip show <name>`.
pub fn parse_pip_show_version(output: &str) -> Option<PyVersion> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Version:")?;
        PyVersion::parse(rest)
    })
}
