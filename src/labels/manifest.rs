use std::io::{Read, Write};
use std::path::Path;

use crate::config::SplitSizes;
use crate::error::SpeechTokError;
use crate::pipeline::traits::Tokenizer;
use crate::types::{EncodedLabel, ManifestRecord};

/// Pairs audio references with their transcripts and encoded labels.
pub struct ManifestGenerator<'a> {
    tokenizer: &'a dyn Tokenizer,
}

impl<'a> ManifestGenerator<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// One record per input pair, in input order.
    pub fn generate<A, T>(
        &self,
        audio_references: &[A],
        transcripts: &[T],
    ) -> Result<Vec<ManifestRecord>, SpeechTokError>
    where
        A: AsRef<str>,
        T: AsRef<str>,
    {
        if audio_references.len() != transcripts.len() {
            return Err(SpeechTokError::LengthMismatch {
                audio_references: audio_references.len(),
                transcripts: transcripts.len(),
            });
        }

        let records: Vec<ManifestRecord> = audio_references
            .iter()
            .zip(transcripts)
            .map(|(audio, transcript)| {
                let transcript = transcript.as_ref();
                ManifestRecord {
                    audio_reference: audio.as_ref().trim().to_string(),
                    raw_transcript: transcript.to_string(),
                    encoded_label: EncodedLabel(self.tokenizer.encode(transcript)),
                }
            })
            .collect();

        let empty_labels = records.iter().filter(|r| r.encoded_label.is_empty()).count();
        if empty_labels > 0 {
            tracing::warn!(
                empty_labels,
                "some transcripts encode to an empty label sequence"
            );
        }
        tracing::info!(records = records.len(), "manifest generated");
        Ok(records)
    }
}

pub fn write_manifest(path: &Path, records: &[ManifestRecord]) -> Result<(), SpeechTokError> {
    let file = std::fs::File::create(path).map_err(|e| SpeechTokError::io("create manifest", e))?;
    write_manifest_to(file, records)?;
    tracing::info!(path = %path.display(), records = records.len(), "manifest written");
    Ok(())
}

/// Writes `audio\ttranscript\tlabel\n` lines without quoting. A field holding
/// a tab or line break is rejected before anything is written.
pub fn write_manifest_to<W: Write>(
    writer: W,
    records: &[ManifestRecord],
) -> Result<(), SpeechTokError> {
    for (index, record) in records.iter().enumerate() {
        check_field(index, "audio reference", &record.audio_reference)?;
        check_field(index, "transcript", &record.raw_transcript)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for record in records {
        let label = record.encoded_label.to_string();
        writer
            .write_record([
                record.audio_reference.as_str(),
                record.raw_transcript.as_str(),
                label.as_str(),
            ])
            .map_err(|e| SpeechTokError::csv("write manifest line", e))?;
    }
    writer
        .flush()
        .map_err(|e| SpeechTokError::io("flush manifest", e))
}

fn check_field(index: usize, name: &str, value: &str) -> Result<(), SpeechTokError> {
    if value.contains(['\t', '\n', '\r']) {
        return Err(SpeechTokError::invalid_input(format!(
            "manifest record {index}: {name} {value:?} contains a tab or line break"
        )));
    }
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>, SpeechTokError> {
    let file = std::fs::File::open(path).map_err(|e| SpeechTokError::io("open manifest", e))?;
    read_manifest_from(file)
}

pub fn read_manifest_from<R: Read>(reader: R) -> Result<Vec<ManifestRecord>, SpeechTokError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| SpeechTokError::csv("read manifest line", e))?;
        if row.len() != 3 {
            return Err(SpeechTokError::invalid_input(format!(
                "manifest line {} has {} fields, expected 3",
                records.len() + 1,
                row.len()
            )));
        }
        records.push(ManifestRecord {
            audio_reference: row[0].to_string(),
            raw_transcript: row[1].to_string(),
            encoded_label: row[2].parse()?,
        });
    }
    Ok(records)
}

/// Positional train/valid/test partition of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSplits {
    pub train: Vec<ManifestRecord>,
    pub valid: Vec<ManifestRecord>,
    pub test: Vec<ManifestRecord>,
}

impl ManifestSplits {
    /// First `sizes.train` records train, the next `sizes.valid` validate,
    /// the rest test. Short manifests leave the later splits short or empty.
    pub fn from_records(mut records: Vec<ManifestRecord>, sizes: &SplitSizes) -> Self {
        let train_end = sizes.train.min(records.len());
        let valid_end = train_end.saturating_add(sizes.valid).min(records.len());
        let test = records.split_off(valid_end);
        let valid = records.split_off(train_end);
        if test.is_empty() {
            tracing::warn!(
                records = train_end + valid.len(),
                train = sizes.train,
                valid = sizes.valid,
                "manifest too short for a test split"
            );
        }
        Self {
            train: records,
            valid,
            test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::character::CharacterTokenizer;
    use crate::labels::vocabulary::Vocabulary;
    use crate::types::SpecialTokens;

    fn tokenizer() -> CharacterTokenizer {
        let tokens = SpecialTokens::default();
        CharacterTokenizer::from_vocabulary(Vocabulary::build(["ab", "aab"], &tokens), &tokens)
            .expect("default labels resolve")
    }

    fn record(audio: &str) -> ManifestRecord {
        ManifestRecord {
            audio_reference: audio.to_string(),
            raw_transcript: String::new(),
            encoded_label: EncodedLabel::default(),
        }
    }

    #[test]
    fn single_pair_renders_one_line() {
        let tok = tokenizer();
        let records = ManifestGenerator::new(&tok)
            .generate(&["a.wav "], &["ab"])
            .expect("equal lengths");
        let mut buf = Vec::new();
        write_manifest_to(&mut buf, &records).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a.wav\tab\t4 5\n");
    }

    #[test]
    fn preserves_input_order() {
        let tok = tokenizer();
        let audio = ["3.wav", "1.wav", "2.wav", "0.wav"];
        let transcripts = ["b", "a", "ba", ""];
        let records = ManifestGenerator::new(&tok)
            .generate(&audio, &transcripts)
            .unwrap();
        assert_eq!(records.len(), 4);
        let order: Vec<&str> = records.iter().map(|r| r.audio_reference.as_str()).collect();
        assert_eq!(order, audio);
        assert_eq!(records[2].encoded_label.ids(), &[5, 4]);
        assert!(records[3].encoded_label.is_empty());
    }

    #[test]
    fn length_mismatch_is_error() {
        let tok = tokenizer();
        let err = ManifestGenerator::new(&tok)
            .generate(&["a.wav", "b.wav"], &["ab"])
            .unwrap_err();
        assert!(matches!(
            err,
            SpeechTokError::LengthMismatch {
                audio_references: 2,
                transcripts: 1
            }
        ));
    }

    #[test]
    fn written_manifest_reads_back() {
        let tok = tokenizer();
        let records = ManifestGenerator::new(&tok)
            .generate(&[" x.wav", "y.wav"], &["ab \"quoted\"", "zzz"])
            .unwrap();
        let mut buf = Vec::new();
        write_manifest_to(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text, "x.wav\tab \"quoted\"\t4 5\ny.wav\tzzz\t\n");
        assert_eq!(read_manifest_from(buf.as_slice()).unwrap(), records);
    }

    #[test]
    fn write_rejects_breaks_inside_fields() {
        let tok = tokenizer();
        for (audio, transcript) in [("a.wav", "a\nb"), ("a.wav", "a\tb"), ("a\r.wav", "ab")] {
            let records = ManifestGenerator::new(&tok)
                .generate(&[audio], &[transcript])
                .unwrap();
            let mut buf = Vec::new();
            let err = write_manifest_to(&mut buf, &records).unwrap_err();
            assert!(matches!(err, SpeechTokError::InvalidInput { .. }));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn one_line_per_record_for_filtered_transcripts() {
        let tok = tokenizer();
        let transcript = crate::labels::preprocess::filter_sentence("가\n나\t다");
        assert_eq!(transcript, "가 나 다");
        let records = ManifestGenerator::new(&tok)
            .generate(&["a.wav", "b.wav"], &[transcript.as_str(), "a"])
            .unwrap();
        let mut buf = Vec::new();
        write_manifest_to(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(read_manifest_from(buf.as_slice()).unwrap(), records);
    }

    #[test]
    fn read_rejects_short_lines() {
        assert!(read_manifest_from("a.wav\tab\n".as_bytes()).is_err());
        assert!(read_manifest_from("a.wav\tab\t4 x\n".as_bytes()).is_err());
    }

    #[test]
    fn splits_slice_positionally() {
        let records: Vec<_> = (0..10).map(|i| record(&format!("{i}.wav"))).collect();
        let splits = ManifestSplits::from_records(records, &SplitSizes { train: 6, valid: 3 });
        assert_eq!(splits.train.len(), 6);
        assert_eq!(splits.valid.len(), 3);
        assert_eq!(splits.test.len(), 1);
        assert_eq!(splits.train[0].audio_reference, "0.wav");
        assert_eq!(splits.valid[0].audio_reference, "6.wav");
        assert_eq!(splits.test[0].audio_reference, "9.wav");
    }

    #[test]
    fn splits_clamp_short_manifests() {
        let records: Vec<_> = (0..4).map(|i| record(&format!("{i}.wav"))).collect();
        let splits = ManifestSplits::from_records(records, &SplitSizes { train: 3, valid: 5 });
        assert_eq!(splits.train.len(), 3);
        assert_eq!(splits.valid.len(), 1);
        assert!(splits.test.is_empty());
    }
}
