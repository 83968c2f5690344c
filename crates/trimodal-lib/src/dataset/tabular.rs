//! Header-driven parsing of the tabular dataset splits.
//!
//! The split files are comma-separated with a header row; transcripts are
//! quoted and may embed commas, doubled quotes and newlines. Columns beyond
//! the required set are ignored. No parsing crate is used; the state machine
//! below covers the quoting rules the split files actually exercise.

use crate::error::{DatasetError, Result};

pub const TRANSCRIPT_COLUMN: &str = "Utterance";
pub const SPEAKER_COLUMN: &str = "Speaker";
pub const EMOTION_COLUMN: &str = "Emotion";
pub const SENTIMENT_COLUMN: &str = "Sentiment";
pub const DIALOGUE_ID_COLUMN: &str = "Dialogue_ID";
pub const UTTERANCE_ID_COLUMN: &str = "Utterance_ID";

/// One parsed input row, prior to label mapping and joining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtteranceRecord {
    pub transcript: String,
    pub speaker: String,
    pub emotion: String,
    pub sentiment: String,
    pub dialogue_id: i64,
    pub utterance_id: i64,
    /// 1-based source line the row starts on, for diagnostics.
    pub line: usize,
}

/// Parse CSV text into records.
///
/// Fails with `MissingColumn` if the header lacks a required column and with
/// `MalformedRow` if a row is too short or carries unparsable id fields.
pub fn parse_records(text: &str) -> Result<Vec<UtteranceRecord>> {
    let rows = split_rows(text);
    let (_, header) = rows.first().ok_or_else(|| DatasetError::MissingColumn {
        column: TRANSCRIPT_COLUMN.to_string(),
    })?;

    let transcript_idx = column_index(header, TRANSCRIPT_COLUMN)?;
    let speaker_idx = column_index(header, SPEAKER_COLUMN)?;
    let emotion_idx = column_index(header, EMOTION_COLUMN)?;
    let sentiment_idx = column_index(header, SENTIMENT_COLUMN)?;
    let dialogue_id_idx = column_index(header, DIALOGUE_ID_COLUMN)?;
    let utterance_id_idx = column_index(header, UTTERANCE_ID_COLUMN)?;

    let mut records = Vec::with_capacity(rows.len().saturating_sub(1));
    for (line, row) in rows.into_iter().skip(1) {
        records.push(UtteranceRecord {
            transcript: field(&row, transcript_idx, TRANSCRIPT_COLUMN, line)?.to_string(),
            speaker: field(&row, speaker_idx, SPEAKER_COLUMN, line)?.trim().to_string(),
            emotion: field(&row, emotion_idx, EMOTION_COLUMN, line)?.trim().to_string(),
            sentiment: field(&row, sentiment_idx, SENTIMENT_COLUMN, line)?
                .trim()
                .to_string(),
            dialogue_id: parse_id(
                field(&row, dialogue_id_idx, DIALOGUE_ID_COLUMN, line)?,
                DIALOGUE_ID_COLUMN,
                line,
            )?,
            utterance_id: parse_id(
                field(&row, utterance_id_idx, UTTERANCE_ID_COLUMN, line)?,
                UTTERANCE_ID_COLUMN,
                line,
            )?,
            line,
        });
    }
    Ok(records)
}

fn field<'r>(row: &'r [String], idx: usize, name: &str, line: usize) -> Result<&'r str> {
    row.get(idx)
        .map(String::as_str)
        .ok_or_else(|| DatasetError::MalformedRow {
            line,
            message: format!("row has {} fields, `{}` expects index {}", row.len(), name, idx),
        })
}

fn column_index(header: &[String], name: &str) -> Result<usize> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DatasetError::MissingColumn {
            column: name.to_string(),
        })
}

fn parse_id(field: &str, column: &str, line: usize) -> Result<i64> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| DatasetError::MalformedRow {
            line,
            message: format!("invalid {column} `{field}`"),
        })
}

/// Split CSV text into rows of fields, honoring double-quoted fields with
/// doubled-quote escapes and embedded commas/newlines. Returns the 1-based
/// line each row starts on. Blank lines are skipped.
fn split_rows(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1usize;
    let mut row_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if !in_quotes => {
                // Swallowed; the '\n' that follows ends the row.
            }
            '\n' if !in_quotes => {
                line += 1;
                if !fields.is_empty() || !field.trim().is_empty() {
                    fields.push(std::mem::take(&mut field));
                    rows.push((row_line, std::mem::take(&mut fields)));
                } else {
                    field.clear();
                }
                field_started = false;
                row_line = line;
            }
            '\n' => {
                line += 1;
                field.push('\n');
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if !fields.is_empty() || !field.trim().is_empty() {
        fields.push(field);
        rows.push((row_line, fields));
    }
    rows
}
