pub mod config;
pub mod error;
pub mod labels;
mod model;
pub mod pipeline;
pub mod types;

pub use config::{CellKind, DecoderConfig, PipelineConfig, TokenizerConfig};
pub use error::SpeechTokError;
pub use labels::character::CharacterTokenizer;
pub use labels::manifest::{ManifestGenerator, ManifestSplits};
pub use labels::vocabulary::Vocabulary;
pub use model::cells::{CellState, DecoderState};
pub use pipeline::builder::SequenceDecoderBuilder;
pub use pipeline::decoder::{greedy_transcripts, DecodeMode, SequenceDecoder};
pub use pipeline::registry::TokenizerRegistry;
pub use pipeline::traits::{Tokenizer, TranscriptSource};
pub use types::{EncodedLabel, ManifestRecord, SpecialIds, SpecialTokens, VocabularyEntry};
