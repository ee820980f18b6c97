use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::SpeechTokError;
use crate::labels::table;
use crate::types::{SpecialTokens, VocabularyEntry, FIRST_REGULAR_ID};

/// Id-ordered vocabulary table: four reserved entries followed by corpus
/// characters ranked by frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<VocabularyEntry>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Builds the vocabulary of a transcript corpus.
    ///
    /// Every occurrence of a character counts; corpus order has no influence
    /// on the result.
    pub fn build<I, S>(transcripts: I, special_tokens: &SpecialTokens) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reserved = special_tokens.labels();
        let mut counts: HashMap<char, u64> = HashMap::new();
        let mut transcript_count = 0usize;
        for transcript in transcripts {
            transcript_count += 1;
            for c in transcript.as_ref().chars() {
                *counts.entry(c).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(char, u64)> = counts
            .into_iter()
            .filter(|(c, _)| !is_reserved_char(*c, &reserved))
            .collect();
        ranked.sort_by(rank_order);

        let mut entries = Vec::with_capacity(reserved.len() + ranked.len());
        for (id, label) in reserved.iter().enumerate() {
            entries.push(VocabularyEntry {
                id,
                character: (*label).to_string(),
                frequency: 0,
            });
        }
        for (offset, (c, frequency)) in ranked.into_iter().enumerate() {
            entries.push(VocabularyEntry {
                id: FIRST_REGULAR_ID + offset,
                character: c.to_string(),
                frequency,
            });
        }

        tracing::info!(
            transcripts = transcript_count,
            entries = entries.len(),
            "vocabulary built"
        );
        Self::indexed(entries)
    }

    /// Wraps entries read from a table, rejecting duplicate ids or characters.
    pub fn from_entries(mut entries: Vec<VocabularyEntry>) -> Result<Self, SpeechTokError> {
        entries.sort_by_key(|e| e.id);
        for pair in entries.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SpeechTokError::invalid_input(format!(
                    "duplicate vocabulary id {}",
                    pair[0].id
                )));
            }
        }
        check_unique_characters(&entries)?;
        Ok(Self::indexed(entries))
    }

    /// `entries` must be id-ordered with unique characters.
    fn indexed(entries: Vec<VocabularyEntry>) -> Self {
        let index = entries
            .iter()
            .map(|e| (e.character.clone(), e.id))
            .collect();
        Self { entries, index }
    }

    pub fn load(path: &Path) -> Result<Self, SpeechTokError> {
        let entries = table::read_table(path)?;
        Self::from_entries(entries).map_err(|e| SpeechTokError::vocab_load(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<(), SpeechTokError> {
        table::write_table(path, &self.entries)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "vocabulary table written");
        Ok(())
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id_of(&self, character: &str) -> Option<usize> {
        self.index.get(character).copied()
    }
}

/// Frequency descending, then code point descending.
fn rank_order(a: &(char, u64), b: &(char, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0))
}

fn check_unique_characters(entries: &[VocabularyEntry]) -> Result<(), SpeechTokError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.character.is_empty() {
            return Err(SpeechTokError::invalid_input(format!(
                "vocabulary id {} has an empty character",
                entry.id
            )));
        }
        if !seen.insert(entry.character.as_str()) {
            return Err(SpeechTokError::invalid_input(format!(
                "duplicate vocabulary character {:?}",
                entry.character
            )));
        }
    }
    Ok(())
}

fn is_reserved_char(c: char, reserved: &[&str; 4]) -> bool {
    reserved.iter().any(|label| {
        let mut it = label.chars();
        it.next() == Some(c) && it.next().is_none()
    })
}
