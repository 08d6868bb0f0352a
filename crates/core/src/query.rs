//! Execution surface for an external query compiler: run a compiled SQL
//! statement against the store, or evaluate a predicate against one media
//! item in memory without touching the database.

use crate::domain::{MediaRecord, Tag};
use crate::error::{Error, Result};
use crate::store::{media_by_id_tx, Store};

/// Upper bound on how many nodes a compound-tag definition may expand to
/// before compilation gives up. Definitions reference other compound tags,
/// so an adversarial chain can otherwise blow up exponentially.
pub const MAX_EXPANSION_NODES: usize = 4096;

/// Node budget handed to the query compiler while it inlines compound-tag
/// definitions. Charging past the limit fails the whole compilation.
#[derive(Debug)]
pub struct ExpansionBudget {
    remaining: usize,
}

impl Default for ExpansionBudget {
    fn default() -> Self {
        ExpansionBudget {
            remaining: MAX_EXPANSION_NODES,
        }
    }
}

impl ExpansionBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge(&mut self, nodes: usize) -> Result<()> {
        if nodes > self.remaining {
            return Err(Error::DefinitionTooComplex {
                limit: MAX_EXPANSION_NODES,
            });
        }
        self.remaining -= nodes;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

/// A compiled query's in-memory form, used to answer "does this one item
/// match" without running SQL — e.g. to decide whether a freshly imported
/// file belongs to a live result view.
pub trait MediaPredicate {
    fn matches(&self, media: &MediaRecord, tags: &[Tag]) -> bool;
}

impl Store {
    /// Run a compiled statement selecting image ids and hydrate the records,
    /// preserving the statement's ordering. An empty statement is the
    /// compiled form of the empty query and short-circuits to an empty
    /// result without touching the database.
    pub fn search(&self, compiled_sql: &str) -> Result<Vec<MediaRecord>> {
        if compiled_sql.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn_for_query();
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare(compiled_sql)?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            // rows can vanish between the two statements; skip, don't fail
            if let Ok(record) = media_by_id_tx(&conn, id) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Evaluate an in-memory predicate against one stored item.
    pub fn media_matches(&self, id: i64, predicate: &dyn MediaPredicate) -> Result<bool> {
        let record = self.media(id)?;
        let tags = self.media_tags(id)?;
        Ok(predicate.matches(&record, &tags))
    }
}
