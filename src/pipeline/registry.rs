use std::collections::HashMap;

use crate::config::{TokenizerConfig, CHARACTER_UNIT};
use crate::error::SpeechTokError;
use crate::labels::character::CharacterTokenizer;
use crate::pipeline::traits::Tokenizer;

pub type TokenizerFactory = fn(&TokenizerConfig) -> Result<Box<dyn Tokenizer>, SpeechTokError>;

/// Maps a tokenizer unit name to the factory that loads it.
pub struct TokenizerRegistry {
    factories: HashMap<String, TokenizerFactory>,
}

impl TokenizerRegistry {
    /// Registry without any unit.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CHARACTER_UNIT, |cfg| {
            Ok(Box::new(CharacterTokenizer::load(cfg)?) as Box<dyn Tokenizer>)
        });
        registry
    }

    /// Replaces any factory already registered under `unit`.
    pub fn register(&mut self, unit: impl Into<String>, factory: TokenizerFactory) {
        self.factories.insert(unit.into(), factory);
    }

    pub fn build(&self, config: &TokenizerConfig) -> Result<Box<dyn Tokenizer>, SpeechTokError> {
        let factory = self
            .factories
            .get(config.unit.as_str())
            .ok_or_else(|| SpeechTokError::UnsupportedUnit {
                unit: config.unit.clone(),
            })?;
        factory(config)
    }

    /// Registered unit names, sorted.
    pub fn units(&self) -> Vec<&str> {
        let mut units: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        units.sort_unstable();
        units
    }
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
