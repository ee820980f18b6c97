use std::io::{Read, Write};
use std::path::Path;

use crate::error::SpeechTokError;
use crate::types::VocabularyEntry;

pub(crate) fn read_table(path: &Path) -> Result<Vec<VocabularyEntry>, SpeechTokError> {
    let file = std::fs::File::open(path).map_err(|e| SpeechTokError::vocab_load(path, e))?;
    read_entries(file).map_err(|e| SpeechTokError::vocab_load(path, e))
}

pub(crate) fn read_entries<R: Read>(reader: R) -> Result<Vec<VocabularyEntry>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader)
        .deserialize()
        .collect()
}

pub(crate) fn write_table(path: &Path, entries: &[VocabularyEntry]) -> Result<(), SpeechTokError> {
    let file =
        std::fs::File::create(path).map_err(|e| SpeechTokError::io("create vocabulary table", e))?;
    write_entries(file, entries)
}

pub(crate) fn write_entries<W: Write>(
    writer: W,
    entries: &[VocabularyEntry],
) -> Result<(), SpeechTokError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|e| SpeechTokError::csv("write vocabulary row", e))?;
    }
    writer
        .flush()
        .map_err(|e| SpeechTokError::io("flush vocabulary table", e))
}
