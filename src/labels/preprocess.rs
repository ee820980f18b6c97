use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;

use crate::error::SpeechTokError;
use crate::pipeline::traits::TranscriptSource;

const HANGUL_SYLLABLES: std::ops::RangeInclusive<char> = '\u{AC00}'..='\u{D7A3}';

/// Keeps Hangul syllables and whitespace, drops everything else. Tabs and
/// line breaks become plain spaces so a transcript stays one manifest field.
pub fn filter_sentence(raw: &str) -> String {
    raw.chars()
        .filter(|c| HANGUL_SYLLABLES.contains(c) || c.is_whitespace())
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

#[derive(Debug, Deserialize)]
struct LabelDocument {
    transcription: LabelTranscription,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct LabelTranscription {
    reading_label_text: String,
    answer_label_text: String,
}

/// Reads JSON label files carrying `transcription.ReadingLabelText` (script
/// reading) and `transcription.AnswerLabelText` (free answer).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLabelSource;

impl JsonLabelSource {
    pub fn parse(&self, json: &str) -> Result<String, SpeechTokError> {
        let doc: LabelDocument =
            serde_json::from_str(json).map_err(|e| SpeechTokError::json("parse label file", e))?;
        let t = doc.transcription;
        let text = if t.reading_label_text.trim().is_empty() {
            t.answer_label_text
        } else {
            t.reading_label_text
        };
        Ok(filter_sentence(&text))
    }
}

impl TranscriptSource for JsonLabelSource {
    fn extract(&self, path: &Path) -> Result<String, SpeechTokError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| SpeechTokError::io("read label file", e))?;
        self.parse(&data)
    }
}

/// `<root>/label/<group>/x.json` → `<root>/audio/<group>/x.wav`.
pub fn audio_path_for_label(label_path: &Path) -> PathBuf {
    let mut audio: PathBuf = label_path
        .components()
        .map(|c| match c {
            Component::Normal(name) if name == "label" => Component::Normal("audio".as_ref()),
            other => other,
        })
        .collect();
    audio.set_extension("wav");
    audio
}

/// Parses `audio\ttranscript` listing lines, filtering each transcript.
pub fn parse_transcript_listing(text: &str) -> Result<Vec<(String, String)>, SpeechTokError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let (audio, transcript) = line.split_once('\t').ok_or_else(|| {
                SpeechTokError::invalid_input(format!(
                    "listing line {} has no tab separator",
                    idx + 1
                ))
            })?;
            Ok((audio.to_string(), filter_sentence(transcript)))
        })
        .collect()
}

pub fn read_transcript_listing(path: &Path) -> Result<Vec<(String, String)>, SpeechTokError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| SpeechTokError::io("read transcript listing", e))?;
    parse_transcript_listing(&text)
}

/// Available parallelism minus one, at least one worker.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Extracts one transcript per path on a bounded worker pool.
///
/// Each task writes into the slot of its input index, so the output order is
/// the input order whatever the completion order. The first failing task
/// aborts the batch.
pub fn extract_transcripts(
    paths: &[PathBuf],
    source: &dyn TranscriptSource,
    workers: usize,
) -> Result<Vec<String>, SpeechTokError> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("speechtok-preprocess-{i}"))
        .build()
        .map_err(|e| SpeechTokError::runtime("build preprocessing pool", e))?;

    tracing::info!(files = paths.len(), workers, "transcript extraction started");

    let mut slots: Vec<Option<String>> = vec![None; paths.len()];
    pool.install(|| {
        slots
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(index, slot)| {
                let path = &paths[index];
                let transcript =
                    source
                        .extract(path)
                        .map_err(|e| SpeechTokError::TaskFailure {
                            index,
                            path: path.display().to_string(),
                            source: Box::new(e),
                        })?;
                *slot = Some(transcript);
                Ok(())
            })
    })?;

    let transcripts: Vec<String> = slots.into_iter().map(Option::unwrap_or_default).collect();
    tracing::info!(transcripts = transcripts.len(), "transcript extraction finished");
    Ok(transcripts)
}
