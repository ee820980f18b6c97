use std::path::Path;

use crate::error::SpeechTokError;
use crate::types::SpecialIds;

pub trait Tokenizer: Send + Sync {
    /// Maps text to label ids. Characters missing from the vocabulary are
    /// dropped without error.
    fn encode(&self, text: &str) -> Vec<usize>;

    /// Maps ids back to text, stopping at the first end-of-sequence id and
    /// skipping blank ids.
    fn decode(&self, ids: &[usize]) -> Result<String, SpeechTokError>;

    fn decode_batch(&self, batch: &[Vec<usize>]) -> Result<Vec<String>, SpeechTokError> {
        batch.iter().map(|ids| self.decode(ids)).collect()
    }

    fn vocab_size(&self) -> usize;

    fn special_ids(&self) -> SpecialIds;
}

/// Extracts the transcript text of one corpus source file.
pub trait TranscriptSource: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, SpeechTokError>;
}
