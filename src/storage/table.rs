use std::collections::{BTreeMap, BTreeSet};

use crate::models::Record;

/// Records keyed by identifier, with a secondary index on `name`.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    rows: BTreeMap<String, Record>,
    name_index: BTreeMap<String, BTreeSet<String>>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-update keyed by identifier.
    ///
    /// On conflict every column takes the incoming value except `created_at`,
    /// which keeps the value of the first insert.
    pub fn upsert(&mut self, mut record: Record) -> u64 {
        if let Some(existing) = self.rows.get(&record.id).cloned() {
            record.created_at = existing.created_at;
            self.unindex_name(&existing);
        }

        self.index_name(&record);
        self.rows.insert(record.id.clone(), record);
        1
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.rows.get(id)
    }

    pub fn first_by_name(&self, name: &str) -> Option<&Record> {
        self.name_index
            .get(name)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| self.rows.get(id))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn index_name(&mut self, record: &Record) {
        self.name_index
            .entry(record.name.clone())
            .or_default()
            .insert(record.id.clone());
    }

    fn unindex_name(&mut self, record: &Record) {
        if let Some(ids) = self.name_index.get_mut(&record.name) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.name_index.remove(&record.name);
            }
        }
    }
}
