//! Word timings and the immutable per-reading timing table.
//!
//! [`TimingTable`] can only be built through a validating constructor, so an
//! engine holding one never has to re-check ordering or overlap.  Decoded
//! JSON arrives as [`TimingTableData`] and is converted with `TryFrom`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::key::ReadingCategory;

// ---------------------------------------------------------------------------
// WordTiming
// ---------------------------------------------------------------------------

/// One spoken word.
///
/// The interval is `[start_ms, end_ms)`: start inclusive, end exclusive.
/// `char_offset` / `char_length` locate the word in the source text and are
/// opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTiming {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub index: usize,
    #[serde(default)]
    pub char_offset: usize,
    #[serde(default)]
    pub char_length: usize,
}

impl WordTiming {
    /// Whether `position_ms` falls inside this word's interval.
    pub fn contains(&self, position_ms: u64) -> bool {
        self.start_ms <= position_ms && position_ms < self.end_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

// ---------------------------------------------------------------------------
// TimingError
// ---------------------------------------------------------------------------

/// Data-contract violations in timing data: caught while building a
/// [`TimingTable`], or when a table does not belong to the requested reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    #[error("word at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: usize },

    #[error("word {index} ends ({end_ms} ms) before it starts ({start_ms} ms)")]
    NegativeLength {
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },

    #[error("word {index} starts ({start_ms} ms) before the previous word ({previous_start_ms} ms)")]
    Unsorted {
        index: usize,
        start_ms: u64,
        previous_start_ms: u64,
    },

    #[error("word {index} starts ({start_ms} ms) before the previous word ends ({previous_end_ms} ms)")]
    Overlap {
        index: usize,
        start_ms: u64,
        previous_end_ms: u64,
    },

    #[error("duration {duration_ms} ms is shorter than the last word's end ({last_end_ms} ms)")]
    DurationTooShort { duration_ms: u64, last_end_ms: u64 },

    #[error("table is for {found}, expected {expected}")]
    KeyMismatch { expected: String, found: String },
}

// ---------------------------------------------------------------------------
// TimingTableData  (wire form)
// ---------------------------------------------------------------------------

/// Unvalidated timing table as it appears on disk or over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingTableData {
    pub reading_id: String,
    pub category: ReadingCategory,
    #[serde(default)]
    pub reference: String,
    pub duration_ms: u64,
    pub words: Vec<WordTiming>,
}

// ---------------------------------------------------------------------------
// TimingTable
// ---------------------------------------------------------------------------

/// Ordered, validated word timings for one spoken passage.
///
/// Invariants (checked by [`TimingTable::new`]):
///
/// * `words[i].index == i`
/// * `words[i].start_ms <= words[i].end_ms`
/// * `words[i].end_ms <= words[i + 1].start_ms` (gaps allowed, overlaps not)
/// * `duration_ms >= words.last().end_ms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingTable {
    reading_id: String,
    category: ReadingCategory,
    reference: String,
    duration_ms: u64,
    words: Vec<WordTiming>,
}

impl TimingTable {
    /// Validate `words` and build a table.
    pub fn new(
        reading_id: impl Into<String>,
        category: ReadingCategory,
        reference: impl Into<String>,
        duration_ms: u64,
        words: Vec<WordTiming>,
    ) -> Result<Self, TimingError> {
        validate(&words, duration_ms)?;
        Ok(Self {
            reading_id: reading_id.into(),
            category,
            reference: reference.into(),
            duration_ms,
            words,
        })
    }

    pub fn reading_id(&self) -> &str {
        &self.reading_id
    }

    pub fn category(&self) -> ReadingCategory {
        self.category
    }

    /// Human-readable scripture reference, e.g. `"John 3:16"`.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn words(&self) -> &[WordTiming] {
        &self.words
    }

    pub fn word(&self, index: usize) -> Option<&WordTiming> {
        self.words.get(index)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Index of the word to highlight at `position_ms`.
    ///
    /// Returns the word whose `[start, end)` contains the position; inside a
    /// gap (or past the last word) the nearest preceding word; `None` when
    /// the position precedes the first word.  When a word's end equals the
    /// next word's start, that boundary belongs to the next word.
    ///
    /// Binary search over start offsets, O(log n).
    ///
    /// ```
    /// use highlight_sync::timing::{ReadingCategory, TimingTable, WordTiming};
    ///
    /// let word = |text: &str, start, end, index| WordTiming {
    ///     text: text.into(), start_ms: start, end_ms: end, index,
    ///     char_offset: 0, char_length: text.len(),
    /// };
    /// let table = TimingTable::new(
    ///     "jn-3-16", ReadingCategory::Gospel, "John 3:16", 900,
    ///     vec![word("For", 0, 340, 0), word("God", 340, 620, 1), word("so", 620, 900, 2)],
    /// ).unwrap();
    ///
    /// assert_eq!(table.word_index_at(0), Some(0));
    /// assert_eq!(table.word_index_at(340), Some(1));
    /// assert_eq!(table.word_index_at(9_999), Some(2));
    /// ```
    pub fn word_index_at(&self, position_ms: u64) -> Option<usize> {
        // Words never overlap, so the last word starting at or before the
        // position either contains it or is the nearest preceding word.
        let starts_before = self.words.partition_point(|w| w.start_ms <= position_ms);
        starts_before.checked_sub(1)
    }

    /// Convenience wrapper around [`word_index_at`](Self::word_index_at).
    pub fn word_at(&self, position_ms: u64) -> Option<&WordTiming> {
        self.word_index_at(position_ms).and_then(|i| self.words.get(i))
    }
}

impl TryFrom<TimingTableData> for TimingTable {
    type Error = TimingError;

    fn try_from(data: TimingTableData) -> Result<Self, Self::Error> {
        TimingTable::new(
            data.reading_id,
            data.category,
            data.reference,
            data.duration_ms,
            data.words,
        )
    }
}

impl From<&TimingTable> for TimingTableData {
    fn from(table: &TimingTable) -> Self {
        Self {
            reading_id: table.reading_id.clone(),
            category: table.category,
            reference: table.reference.clone(),
            duration_ms: table.duration_ms,
            words: table.words.clone(),
        }
    }
}

fn validate(words: &[WordTiming], duration_ms: u64) -> Result<(), TimingError> {
    let mut previous: Option<&WordTiming> = None;

    for (position, word) in words.iter().enumerate() {
        if word.index != position {
            return Err(TimingError::IndexMismatch {
                position,
                index: word.index,
            });
        }
        if word.end_ms < word.start_ms {
            return Err(TimingError::NegativeLength {
                index: word.index,
                start_ms: word.start_ms,
                end_ms: word.end_ms,
            });
        }
        if let Some(prev) = previous {
            if word.start_ms < prev.start_ms {
                return Err(TimingError::Unsorted {
                    index: word.index,
                    start_ms: word.start_ms,
                    previous_start_ms: prev.start_ms,
                });
            }
            if word.start_ms < prev.end_ms {
                return Err(TimingError::Overlap {
                    index: word.index,
                    start_ms: word.start_ms,
                    previous_end_ms: prev.end_ms,
                });
            }
        }
        previous = Some(word);
    }

    if let Some(last) = words.last() {
        if duration_ms < last.end_ms {
            return Err(TimingError::DurationTooShort {
                duration_ms,
                last_end_ms: last.end_ms,
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
