use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpeechTokError;

pub const PAD_ID: usize = 0;
pub const SOS_ID: usize = 1;
pub const EOS_ID: usize = 2;
pub const BLANK_ID: usize = 3;
/// First id handed out to a corpus character.
pub const FIRST_REGULAR_ID: usize = 4;

/// One row of the vocabulary table.
///
/// Regular entries hold exactly one code point in `character`; the reserved
/// entries hold their token label (e.g. `<pad>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: usize,
    #[serde(alias = "char")]
    pub character: String,
    #[serde(alias = "freq")]
    pub frequency: u64,
}

/// Labels of the four reserved vocabulary entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokens {
    pub pad_token: String,
    pub sos_token: String,
    pub eos_token: String,
    pub blank_token: String,
}

impl SpecialTokens {
    /// Labels in reserved-id order: pad, sos, eos, blank.
    pub fn labels(&self) -> [&str; 4] {
        [
            self.pad_token.as_str(),
            self.sos_token.as_str(),
            self.eos_token.as_str(),
            self.blank_token.as_str(),
        ]
    }
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            pad_token: "<pad>".to_string(),
            sos_token: "<sos>".to_string(),
            eos_token: "<eos>".to_string(),
            blank_token: "<blank>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialIds {
    pub pad: usize,
    pub sos: usize,
    pub eos: usize,
    pub blank: usize,
}

impl Default for SpecialIds {
    fn default() -> Self {
        Self {
            pad: PAD_ID,
            sos: SOS_ID,
            eos: EOS_ID,
            blank: BLANK_ID,
        }
    }
}

/// Label id sequence, rendered as space-separated decimal ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedLabel(pub Vec<usize>);

impl EncodedLabel {
    pub fn ids(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for EncodedLabel {
    fn from(ids: Vec<usize>) -> Self {
        Self(ids)
    }
}

impl fmt::Display for EncodedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids = self.0.iter();
        if let Some(first) = ids.next() {
            write!(f, "{first}")?;
            for id in ids {
                write!(f, " {id}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for EncodedLabel {
    type Err = SpeechTokError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(|tok| {
                tok.parse::<usize>().map_err(|e| {
                    SpeechTokError::invalid_input(format!("bad label id '{tok}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub audio_reference: String,
    pub raw_transcript: String,
    pub encoded_label: EncodedLabel,
}
