use std::collections::HashMap;

use super::row::CustomDbRow;
use crate::cache::CacheKey;
use crate::types::RowValues;

/// Rows keyed by the value of one column, in first-insertion order of the keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedRows {
    entries: Vec<(RowValues, CustomDbRow)>,
    index: HashMap<CacheKey, usize>,
}

impl KeyedRows {
    /// Insert `row` under `key`, returning the row it replaced.
    pub fn insert(&mut self, key: RowValues, row: CustomDbRow) -> Option<CustomDbRow> {
        let lookup = CacheKey::from_parts([key.clone()]);
        if let Some(&pos) = self.index.get(&lookup) {
            return Some(std::mem::replace(&mut self.entries[pos].1, row));
        }
        self.index.insert(lookup, self.entries.len());
        self.entries.push((key, row));
        None
    }

    #[must_use]
    pub fn get(&self, key: &RowValues) -> Option<&CustomDbRow> {
        let lookup = CacheKey::from_parts([key.clone()]);
        self.index.get(&lookup).map(|&pos| &self.entries[pos].1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowValues> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowValues, &CustomDbRow)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for KeyedRows {
    type Item = (RowValues, CustomDbRow);
    type IntoIter = std::vec::IntoIter<(RowValues, CustomDbRow)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
