//! Per-row accumulation state, bounded to one flush epoch

use std::collections::HashMap;

/// Counters for one row index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowState {
    /// Next column to assign; grows by exactly the elements produced
    pub column_offset: u64,
    /// Accepted data events for this row
    pub hit_count: u64,
}

impl RowState {
    /// Record one accepted record that produced `produced` elements
    pub fn advance(&mut self, produced: usize) {
        self.add_columns(produced);
        self.hit_count += 1;
    }

    /// Claim `produced` columns without counting a hit
    pub fn add_columns(&mut self, produced: usize) {
        self.column_offset += produced as u64;
    }
}

/// Row states seen since the last flush epoch opened
#[derive(Debug, Default)]
pub struct RowStates {
    rows: HashMap<u32, RowState>,
}

impl RowStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `row_index`, created at `{0, 0}` on first sight
    pub fn entry(&mut self, row_index: u32) -> &mut RowState {
        self.rows.entry(row_index).or_default()
    }

    pub fn get(&self, row_index: u32) -> Option<RowState> {
        self.rows.get(&row_index).copied()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Verdict taken at a split record's first tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVerdict {
    Admitted,
    Dropped,
}

#[derive(Debug, Clone, Copy)]
struct OpenRecord {
    verdict: RecordVerdict,
    remaining: u32,
}

/// Split records whose first tuple has been seen but not their last.
///
/// Survives flush epochs so one record is never cut in two.
#[derive(Debug, Default)]
pub struct SplitRecords {
    open: HashMap<u32, OpenRecord>,
}

impl SplitRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the verdict for the `remaining` tuples still to come
    pub fn open(&mut self, row_index: u32, verdict: RecordVerdict, remaining: u32) {
        if remaining == 0 {
            self.open.remove(&row_index);
        } else {
            self.open.insert(row_index, OpenRecord { verdict, remaining });
        }
    }

    /// Verdict for the next continuation tuple of `row_index`
    pub fn next_part(&mut self, row_index: u32) -> Option<RecordVerdict> {
        let record = self.open.get_mut(&row_index)?;
        let verdict = record.verdict;
        record.remaining = record.remaining.saturating_sub(1);
        if record.remaining == 0 {
            self.open.remove(&row_index);
        }
        Some(verdict)
    }

    /// Drop the rest of an open record
    pub fn reject(&mut self, row_index: u32) {
        if let Some(record) = self.open.get_mut(&row_index) {
            record.verdict = RecordVerdict::Dropped;
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_starts_at_zero() {
        let mut rows = RowStates::new();
        assert_eq!(*rows.entry(3), RowState::default());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_advance() {
        let mut rows = RowStates::new();
        rows.entry(3).advance(2);
        rows.entry(3).advance(3);
        assert_eq!(
            rows.get(3),
            Some(RowState {
                column_offset: 5,
                hit_count: 2
            })
        );

        rows.clear();
        assert!(rows.is_empty());
        assert_eq!(rows.get(3), None);
    }

    #[test]
    fn test_split_record_verdict_covers_remaining_parts() {
        let mut records = SplitRecords::new();
        records.open(4, RecordVerdict::Dropped, 2);

        assert_eq!(records.next_part(4), Some(RecordVerdict::Dropped));
        assert_eq!(records.len(), 1);
        assert_eq!(records.next_part(4), Some(RecordVerdict::Dropped));
        assert!(records.is_empty());
        assert_eq!(records.next_part(4), None);
    }

    #[test]
    fn test_single_part_record_is_not_kept_open() {
        let mut records = SplitRecords::new();
        records.open(1, RecordVerdict::Admitted, 0);
        assert!(records.is_empty());

        records.open(1, RecordVerdict::Admitted, 1);
        records.reject(1);
        assert_eq!(records.next_part(1), Some(RecordVerdict::Dropped));
    }
}
