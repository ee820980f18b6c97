use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::TokenizerConfig;
use crate::error::SpeechTokError;
use crate::labels::vocabulary::Vocabulary;
use crate::pipeline::traits::Tokenizer;
use crate::types::{SpecialIds, SpecialTokens};

/// Character-level tokenizer backed by a vocabulary table.
#[derive(Debug, Clone)]
pub struct CharacterTokenizer {
    vocabulary: Vocabulary,
    char_to_id: HashMap<char, usize>,
    id_to_label: HashMap<usize, String>,
    special_ids: SpecialIds,
    vocab_path: Option<PathBuf>,
}

impl CharacterTokenizer {
    pub fn load(config: &TokenizerConfig) -> Result<Self, SpeechTokError> {
        config.check_encoding()?;
        let vocabulary = Vocabulary::load(&config.vocab_path)?;
        let mut tokenizer = Self::from_vocabulary(vocabulary, &config.special_tokens)
            .map_err(|e| SpeechTokError::vocab_load(&config.vocab_path, e))?;
        tokenizer.vocab_path = Some(config.vocab_path.clone());
        tracing::info!(
            path = %config.vocab_path.display(),
            vocab_size = tokenizer.vocab_size(),
            "character tokenizer loaded"
        );
        Ok(tokenizer)
    }

    /// Resolves the special token labels against `vocabulary`.
    pub fn from_vocabulary(
        vocabulary: Vocabulary,
        special_tokens: &SpecialTokens,
    ) -> Result<Self, SpeechTokError> {
        let resolve = |label: &str| {
            vocabulary.id_of(label).ok_or_else(|| {
                SpeechTokError::invalid_input(format!(
                    "special token '{label}' is missing from the vocabulary"
                ))
            })
        };
        let special_ids = SpecialIds {
            pad: resolve(&special_tokens.pad_token)?,
            sos: resolve(&special_tokens.sos_token)?,
            eos: resolve(&special_tokens.eos_token)?,
            blank: resolve(&special_tokens.blank_token)?,
        };

        let mut char_to_id = HashMap::with_capacity(vocabulary.len());
        let mut id_to_label = HashMap::with_capacity(vocabulary.len());
        for entry in vocabulary.entries() {
            let mut chars = entry.character.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                char_to_id.insert(c, entry.id);
            }
            id_to_label.insert(entry.id, entry.character.clone());
        }

        Ok(Self {
            vocabulary,
            char_to_id,
            id_to_label,
            special_ids,
            vocab_path: None,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn vocab_path(&self) -> Option<&Path> {
        self.vocab_path.as_deref()
    }
}

impl Tokenizer for CharacterTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        text.chars()
            .filter_map(|c| self.char_to_id.get(&c).copied())
            .collect()
    }

    fn decode(&self, ids: &[usize]) -> Result<String, SpeechTokError> {
        let mut sentence = String::new();
        for &id in ids {
            if id == self.special_ids.eos {
                break;
            }
            if id == self.special_ids.blank {
                continue;
            }
            let label = self
                .id_to_label
                .get(&id)
                .ok_or(SpeechTokError::UnknownId { id })?;
            sentence.push_str(label);
        }
        Ok(sentence)
    }

    fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn special_ids(&self) -> SpecialIds {
        self.special_ids
    }
}
