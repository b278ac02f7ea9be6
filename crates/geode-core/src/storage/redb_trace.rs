//! # redb-backed Trace Storage
//!
//! A disk-backed trace store using the redb embedded database, providing:
//! - ACID transactions (append is all-or-nothing)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Marks are keyed by id, so the ascending table order IS the append
//! order. The crystal append writes the derived Mark and the crystal
//! record inside one transaction — the atomicity the engine relies on.
//!
//! redb files are not guaranteed bit-identical across runs; the canonical
//! interchange form is the frame log in `formats::persistence`.

use crate::store::{Snapshot, check_links, seal, validate};
use crate::{Crystal, CrystalId, CrystalSeed, GeodeError, Mark, MarkDraft, MarkId, TraceStore};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for marks: MarkId(u64) -> serialized Mark bytes
const MARKS: TableDefinition<u64, &[u8]> = TableDefinition::new("marks");

/// Table for crystals: CrystalId(u64) -> serialized Crystal bytes
const CRYSTALS: TableDefinition<u64, &[u8]> = TableDefinition::new("crystals");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// A disk-backed append-only trace.
pub struct RedbTrace {
    /// The redb database handle.
    db: Database,
    /// Next Mark id; doubles as the snapshot counter.
    next_mark_id: u64,
    /// Next Crystal id.
    next_crystal_id: u64,
}

impl std::fmt::Debug for RedbTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTrace")
            .field("next_mark_id", &self.next_mark_id)
            .field("next_crystal_id", &self.next_crystal_id)
            .finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> GeodeError {
    GeodeError::IoError(e.to_string())
}

impl RedbTrace {
    /// Open or create a trace database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GeodeError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(MARKS).map_err(io_err)?;
            let _ = write_txn.open_table(CRYSTALS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        // Load metadata
        let read_txn = db.begin_read().map_err(io_err)?;
        let (next_mark_id, next_crystal_id) = {
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            let marks = table
                .get("next_mark_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let crystals = table
                .get("next_crystal_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            (marks, crystals)
        };

        Ok(Self {
            db,
            next_mark_id,
            next_crystal_id,
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), GeodeError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    /// Read one Mark's parent list, for append-time link checks.
    fn parent_ids_of(&self, id: MarkId) -> Result<Option<Vec<MarkId>>, GeodeError> {
        Ok(self.get(id)?.map(|m| m.parent_ids))
    }
}

impl TraceStore for RedbTrace {
    fn append_mark(&mut self, draft: MarkDraft) -> Result<Mark, GeodeError> {
        validate(&draft)?;
        let parents = check_links(&draft, self.next_mark_id, |id| self.parent_ids_of(id))?;

        let id = MarkId(self.next_mark_id);
        let next = self.next_mark_id.saturating_add(1);
        let mark = seal(draft, id, parents);
        let mark_bytes = postcard::to_stdvec(&mark)
            .map_err(|e| GeodeError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut marks_table = write_txn.open_table(MARKS).map_err(io_err)?;
            marks_table
                .insert(id.0, mark_bytes.as_slice())
                .map_err(io_err)?;

            let mut meta_table = write_txn.open_table(METADATA).map_err(io_err)?;
            meta_table.insert("next_mark_id", next).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        // Update in-memory state only after successful commit.
        self.next_mark_id = next;
        Ok(mark)
    }

    fn get(&self, id: MarkId) -> Result<Option<Mark>, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(MARKS).map_err(io_err)?;
        let Some(bytes) = table.get(id.0).map_err(io_err)? else {
            return Ok(None);
        };
        let mark: Mark = postcard::from_bytes(bytes.value())
            .map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
        Ok(Some(mark))
    }

    fn contains(&self, id: MarkId) -> Result<bool, GeodeError> {
        Ok(self.get(id)?.is_some())
    }

    fn mark_count(&self) -> Result<usize, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(MARKS).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn snapshot(&self) -> Result<Snapshot, GeodeError> {
        Ok(Snapshot(self.next_mark_id))
    }

    fn marks_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Mark>, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(MARKS).map_err(io_err)?;

        let mut marks = Vec::new();
        for entry in table.range(start.0..=end.0).map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let mark: Mark = postcard::from_bytes(value.value())
                .map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
            marks.push(mark);
        }
        Ok(marks)
    }

    fn all_marks(&self) -> Result<Vec<Mark>, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(MARKS).map_err(io_err)?;

        let mut marks = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let mark: Mark = postcard::from_bytes(value.value())
                .map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
            marks.push(mark);
        }
        Ok(marks)
    }

    fn append_crystal(
        &mut self,
        crystal_seed: CrystalSeed,
        mark: MarkDraft,
    ) -> Result<(Crystal, Mark), GeodeError> {
        validate(&mark)?;
        let parents = check_links(&mark, self.next_mark_id, |id| self.parent_ids_of(id))?;

        let mark_id = MarkId(self.next_mark_id);
        let next_mark = self.next_mark_id.saturating_add(1);
        let sealed = seal(mark, mark_id, parents);

        let crystal_id = CrystalId(self.next_crystal_id);
        let next_crystal = self.next_crystal_id.saturating_add(1);
        let crystal = Crystal {
            id: crystal_id,
            source_range: crystal_seed.source_range,
            selected_marks: crystal_seed.selected_marks,
            summary_text: crystal_seed.summary_text,
            compression_ratio: crystal_seed.compression_ratio,
            preserved_peaks: crystal_seed.preserved_peaks,
            created_at: sealed.created_at,
        };

        let mark_bytes = postcard::to_stdvec(&sealed)
            .map_err(|e| GeodeError::SerializationError(e.to_string()))?;
        let crystal_bytes = postcard::to_stdvec(&crystal)
            .map_err(|e| GeodeError::SerializationError(e.to_string()))?;

        // Single transaction: the derived Mark and the crystal record land
        // together or not at all.
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut marks_table = write_txn.open_table(MARKS).map_err(io_err)?;
            marks_table
                .insert(mark_id.0, mark_bytes.as_slice())
                .map_err(io_err)?;

            let mut crystals_table = write_txn.open_table(CRYSTALS).map_err(io_err)?;
            crystals_table
                .insert(crystal_id.0, crystal_bytes.as_slice())
                .map_err(io_err)?;

            let mut meta_table = write_txn.open_table(METADATA).map_err(io_err)?;
            meta_table.insert("next_mark_id", next_mark).map_err(io_err)?;
            meta_table
                .insert("next_crystal_id", next_crystal)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_mark_id = next_mark;
        self.next_crystal_id = next_crystal;
        Ok((crystal, sealed))
    }

    fn get_crystal(&self, id: CrystalId) -> Result<Option<Crystal>, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(CRYSTALS).map_err(io_err)?;
        let Some(bytes) = table.get(id.0).map_err(io_err)? else {
            return Ok(None);
        };
        let crystal: Crystal = postcard::from_bytes(bytes.value())
            .map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
        Ok(Some(crystal))
    }

    fn crystals_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Crystal>, GeodeError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(CRYSTALS).map_err(io_err)?;

        let mut crystals = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let crystal: Crystal = postcard::from_bytes(value.value())
                .map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
            if crystal.source_range.0 >= start && crystal.source_range.1 <= end {
                crystals.push(crystal);
            }
        }
        Ok(crystals)
    }
}

// =============================================================================
// TESTS
// =============================================================================
