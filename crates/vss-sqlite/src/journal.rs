//! Operations applied to a table's indexes during the open transaction
//!
//! Indexes change in memory as statements run. When SQLite rolls back to a
//! savepoint, the table reloads its committed blobs and replays the journal up
//! to that savepoint's marker.

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Insert { id: i64, vectors: Vec<Vec<f32>> },
    Delete { id: i64 },
    /// One training row; `None` for columns the row left NULL
    Training { vectors: Vec<Option<Vec<f32>>> },
    Savepoint(i32),
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn savepoint(&mut self, level: i32) {
        self.entries.push(JournalEntry::Savepoint(level));
    }

    /// Forget markers at `level` and deeper; their operations stay.
    pub fn release(&mut self, level: i32) {
        self.entries
            .retain(|e| !matches!(e, JournalEntry::Savepoint(l) if *l >= level));
    }

    /// Drop everything recorded after savepoint `level` was opened, keeping
    /// the marker itself. Returns whether anything was dropped.
    pub fn rollback_to(&mut self, level: i32) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .position(|e| matches!(e, JournalEntry::Savepoint(l) if *l >= level))
        else {
            return false;
        };
        let before = self.entries.len();
        self.entries.truncate(pos);
        self.entries.push(JournalEntry::Savepoint(level));
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded operations in order, markers skipped
    pub fn operations(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries
            .iter()
            .filter(|e| !matches!(e, JournalEntry::Savepoint(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(id: i64) -> JournalEntry {
        JournalEntry::Insert {
            id,
            vectors: vec![vec![id as f32]],
        }
    }

    fn ids(journal: &Journal) -> Vec<i64> {
        journal
            .operations()
            .map(|e| match e {
                JournalEntry::Insert { id, .. } | JournalEntry::Delete { id } => *id,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn test_rollback_to_keeps_prefix() {
        let mut journal = Journal::default();
        journal.record(insert(1));
        journal.savepoint(0);
        journal.record(insert(2));
        journal.savepoint(1);
        journal.record(JournalEntry::Delete { id: 1 });

        assert!(journal.rollback_to(1));
        assert_eq!(ids(&journal), vec![1, 2]);

        assert!(journal.rollback_to(0));
        assert_eq!(ids(&journal), vec![1]);

        // The savepoint survives a rollback to it.
        journal.record(insert(3));
        assert!(journal.rollback_to(0));
        assert_eq!(ids(&journal), vec![1]);
    }

    #[test]
    fn test_release_keeps_operations() {
        let mut journal = Journal::default();
        journal.savepoint(0);
        journal.record(insert(1));
        journal.savepoint(1);
        journal.record(insert(2));
        journal.release(1);

        assert!(journal.rollback_to(0));
        assert!(ids(&journal).is_empty());
        assert!(!journal.rollback_to(5));
    }

    #[test]
    fn test_unknown_savepoint_is_noop() {
        let mut journal = Journal::default();
        journal.record(insert(1));
        assert!(!journal.rollback_to(0));
        assert_eq!(ids(&journal), vec![1]);
        journal.clear();
        assert!(journal.is_empty());
    }
}
