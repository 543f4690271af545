//! Detected language domain type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dominant language of a repository, inferred from marker files
///
/// The display names are the values persisted in `ProjectRecord.language`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectedLanguage {
    JavaScript,
    Python,
    Java,
    Go,
    Unknown,
}

impl DetectedLanguage {
    pub const ALL: [DetectedLanguage; 5] = [
        DetectedLanguage::JavaScript,
        DetectedLanguage::Python,
        DetectedLanguage::Java,
        DetectedLanguage::Go,
        DetectedLanguage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedLanguage::JavaScript => "JavaScript",
            DetectedLanguage::Python => "Python",
            DetectedLanguage::Java => "Java",
            DetectedLanguage::Go => "Go",
            DetectedLanguage::Unknown => "Unknown",
        }
    }

    /// Whether an artifact can be generated for this language
    pub fn is_known(&self) -> bool {
        !matches!(self, DetectedLanguage::Unknown)
    }
}

impl fmt::Display for DetectedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectedLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectedLanguage::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| format!("unknown language name: {}", s))
    }
}
