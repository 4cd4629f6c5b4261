use std::collections::HashMap;

use crate::error::StoreError;
use crate::table::Table;

use super::staging_buffer::StagingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Committed,
    Aborted,
}

/// Staged changes of one connection, per table.
///
/// Reads through the owning connection see the staged rows; everyone else
/// keeps seeing the committed snapshots until `commit` swaps them in.
#[derive(Debug)]
pub struct Transaction {
    staging: HashMap<String, StagingBuffer>,
    phase: Phase,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            staging: HashMap::new(),
            phase: Phase::Active,
        }
    }

    fn ensure_active(&self) -> Result<(), StoreError> {
        match self.phase {
            Phase::Active => Ok(()),
            Phase::Committed => Err(StoreError::TransactionConflict(
                "transaction already committed".to_string(),
            )),
            Phase::Aborted => Err(StoreError::TransactionConflict("transaction aborted".to_string())),
        }
    }

    /// Staging buffer of `table`, copying its committed rows on first use.
    pub fn get_or_create_staging_buffer(&mut self, table: &Table) -> Result<&mut StagingBuffer, StoreError> {
        self.ensure_active()?;
        Ok(self
            .staging
            .entry(table.name.clone())
            .or_insert_with(|| StagingBuffer::new(table)))
    }

    pub fn staging_buffer(&self, table_name: &str) -> Option<&StagingBuffer> {
        self.staging.get(table_name)
    }

    /// Swaps every staged table in, or none of them.
    ///
    /// A table whose committed rows were replaced after staging began, or
    /// that would exceed its row limit, fails the whole commit. Callers
    /// serialize commits per database.
    pub fn commit(&mut self, tables: &HashMap<String, Table>) -> Result<(), StoreError> {
        self.ensure_active()?;

        let mut names: Vec<&String> = self
            .staging
            .iter()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(name, _)| name)
            .collect();
        names.sort();

        let mut checked = Vec::with_capacity(names.len());
        for name in names {
            let buffer = &self.staging[name];
            let table = tables.get(name).ok_or_else(|| StoreError::TableNotFound { table: name.clone() })?;
            if !table.is_current(&buffer.base) {
                return Err(StoreError::TransactionConflict(format!(
                    "table '{}' was modified by another transaction",
                    name
                )));
            }
            table.check_row_limit(buffer.row_count())?;
            checked.push((table, name.clone()));
        }

        for (table, name) in checked {
            if let Some(buffer) = self.staging.remove(&name) {
                table.store(buffer.rows);
            }
        }
        self.phase = Phase::Committed;
        Ok(())
    }

    /// Discards the staged rows. No-op once committed or aborted.
    pub fn abort(&mut self) {
        if self.phase == Phase::Active {
            self.phase = Phase::Aborted;
            self.staging.clear();
        }
    }

    pub fn is_committed(&self) -> bool {
        self.phase == Phase::Committed
    }

    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Tables with at least one staged change.
    pub fn staged_table_count(&self) -> usize {
        self.staging.values().filter(|s| !s.is_empty()).count()
    }

    pub fn has_staged_changes(&self) -> bool {
        self.staging.values().any(|s| !s.is_empty())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
