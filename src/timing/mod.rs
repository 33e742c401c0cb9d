//! Timing data model: what the engine highlights against.
//!
//! * [`WordTiming`]: one spoken word with its `[start, end)` interval.
//! * [`TimingTable`]: validated, immutable table for one passage, with the
//!   O(log n) position → word lookup.
//! * [`TimingTableData`]: unvalidated JSON wire form.
//! * [`ReadingKey`]: reading id + [`ReadingCategory`] + [`ReadingDate`].

pub mod key;
pub mod table;

pub use key::{KeyParseError, ReadingCategory, ReadingDate, ReadingKey};
pub use table::{TimingError, TimingTable, TimingTableData, WordTiming};
