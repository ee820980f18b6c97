use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpeechTokError;
use crate::pipeline::traits::Tokenizer;
use crate::types::{SpecialIds, SpecialTokens};

/// Unit name of the built-in character tokenizer.
pub const CHARACTER_UNIT: &str = "character";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_unit")]
    pub unit: String,
    pub vocab_path: PathBuf,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(flatten, default)]
    pub special_tokens: SpecialTokens,
}

impl TokenizerConfig {
    pub fn new(vocab_path: impl Into<PathBuf>) -> Self {
        Self {
            unit: default_unit(),
            vocab_path: vocab_path.into(),
            encoding: default_encoding(),
            special_tokens: SpecialTokens::default(),
        }
    }

    pub(crate) fn check_encoding(&self) -> Result<(), SpeechTokError> {
        match self.encoding.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(()),
            other => Err(SpeechTokError::invalid_input(format!(
                "unsupported vocabulary encoding '{other}', only utf-8 tables are read"
            ))),
        }
    }
}

fn default_unit() -> String {
    CHARACTER_UNIT.to_string()
}
fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Recurrent cell variant of the sequence decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CellKind {
    /// Dual-state cell (hidden + carry).
    Lstm,
    /// Single-state gated cell.
    Gru,
    /// Single-state plain tanh cell.
    Rnn,
}

impl CellKind {
    pub const ALL: [CellKind; 3] = [CellKind::Lstm, CellKind::Gru, CellKind::Rnn];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lstm => "lstm",
            Self::Gru => "gru",
            Self::Rnn => "rnn",
        }
    }

    pub fn is_dual_state(self) -> bool {
        matches!(self, Self::Lstm)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellKind {
    type Err = SpeechTokError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lstm" => Ok(Self::Lstm),
            "gru" => Ok(Self::Gru),
            "rnn" => Ok(Self::Rnn),
            _ => Err(SpeechTokError::UnsupportedCellType {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for CellKind {
    type Error = SpeechTokError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellKind> for String {
    fn from(kind: CellKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub vocab_size: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_hidden_state_dim")]
    pub hidden_state_dim: usize,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_rnn_type")]
    pub rnn_type: CellKind,
    #[serde(default = "default_dropout_p")]
    pub dropout_p: f32,
    #[serde(default = "default_pad_id")]
    pub pad_id: usize,
    #[serde(default = "default_sos_id")]
    pub sos_id: usize,
    #[serde(default = "default_eos_id")]
    pub eos_id: usize,
}

fn default_max_length() -> usize {
    128
}
fn default_hidden_state_dim() -> usize {
    1024
}
fn default_num_layers() -> usize {
    2
}
fn default_rnn_type() -> CellKind {
    CellKind::Lstm
}
fn default_dropout_p() -> f32 {
    0.3
}
fn default_pad_id() -> usize {
    SpecialIds::default().pad
}
fn default_sos_id() -> usize {
    SpecialIds::default().sos
}
fn default_eos_id() -> usize {
    SpecialIds::default().eos
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            vocab_size: 0,
            max_length: default_max_length(),
            hidden_state_dim: default_hidden_state_dim(),
            num_layers: default_num_layers(),
            rnn_type: default_rnn_type(),
            dropout_p: default_dropout_p(),
            pad_id: default_pad_id(),
            sos_id: default_sos_id(),
            eos_id: default_eos_id(),
        }
    }
}

impl DecoderConfig {
    pub fn load(path: &Path) -> Result<Self, SpeechTokError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| SpeechTokError::io("read decoder config", e))?;
        serde_json::from_str(&data).map_err(|e| SpeechTokError::json("parse decoder config", e))
    }

    /// Takes vocabulary size and special ids from a loaded tokenizer.
    pub fn with_tokenizer(mut self, tokenizer: &dyn Tokenizer) -> Self {
        self.vocab_size = tokenizer.vocab_size();
        self.with_special_ids(tokenizer.special_ids())
    }

    pub fn with_special_ids(mut self, ids: SpecialIds) -> Self {
        self.pad_id = ids.pad;
        self.sos_id = ids.sos;
        self.eos_id = ids.eos;
        self
    }

    pub fn with_rnn_type(mut self, name: &str) -> Result<Self, SpeechTokError> {
        self.rnn_type = name.parse()?;
        Ok(self)
    }

    pub(crate) fn validate(&self) -> Result<(), SpeechTokError> {
        if self.vocab_size == 0 {
            return Err(SpeechTokError::invalid_input("decoder vocab_size must be > 0"));
        }
        if self.hidden_state_dim == 0 || self.num_layers == 0 {
            return Err(SpeechTokError::invalid_input(format!(
                "decoder needs hidden_state_dim > 0 and num_layers > 0 (got {} and {})",
                self.hidden_state_dim, self.num_layers
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_p) {
            return Err(SpeechTokError::invalid_input(format!(
                "dropout_p must be in [0, 1), got {}",
                self.dropout_p
            )));
        }
        for (role, id) in [("pad", self.pad_id), ("sos", self.sos_id), ("eos", self.eos_id)] {
            if id >= self.vocab_size {
                return Err(SpeechTokError::invalid_input(format!(
                    "{role}_id {id} is outside the vocabulary (size {})",
                    self.vocab_size
                )));
            }
        }
        Ok(())
    }
}

/// Record counts of the positional train/valid splits; the test split is the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    #[serde(default = "default_train_count")]
    pub train: usize,
    #[serde(default = "default_valid_count")]
    pub valid: usize,
}

fn default_train_count() -> usize {
    16_870
}
fn default_valid_count() -> usize {
    775
}

impl Default for SplitSizes {
    fn default() -> Self {
        Self {
            train: default_train_count(),
            valid: default_valid_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub manifest_file_path: PathBuf,
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
    #[serde(default)]
    pub splits: SplitSizes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    pub dataset: DatasetConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, SpeechTokError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| SpeechTokError::io("read pipeline config", e))?;
        serde_json::from_str(&data).map_err(|e| SpeechTokError::json("parse pipeline config", e))
    }
}
