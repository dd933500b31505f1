//! Index store: the persistent relational catalogue of archive runs,
//! volumes and entries, backed by `rusqlite`. Shares `FileIndex`/
//! `FileIndexRecord`'s purpose (a durable record of what got archived)
//! but is relational rather than a single serialized blob, since the
//! catalogue needs indexed lookups across many runs rather than one
//! archive's own self-description.

pub mod model;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::archive::entry::EntryKind;
use crate::error::Result;

pub use model::{Entity, Entry, Storage, StorageMode, StorageState, Uuid};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS uuids (
    id    INTEGER PRIMARY KEY,
    value TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS entities (
    id          INTEGER PRIMARY KEY,
    uuid_id     INTEGER NOT NULL REFERENCES uuids(id),
    created_at  INTEGER NOT NULL,
    locked      INTEGER NOT NULL DEFAULT 0,
    entry_count INTEGER NOT NULL DEFAULT 0,
    total_size  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_entities_uuid ON entities(uuid_id);
CREATE TABLE IF NOT EXISTS storages (
    id          INTEGER PRIMARY KEY,
    entity_id   INTEGER NOT NULL REFERENCES entities(id),
    name        TEXT NOT NULL,
    state       INTEGER NOT NULL DEFAULT 0,
    mode        INTEGER NOT NULL DEFAULT 0,
    size        INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_storages_entity ON storages(entity_id);
CREATE INDEX IF NOT EXISTS idx_storages_name ON storages(name);
CREATE TABLE IF NOT EXISTS entries (
    id          INTEGER PRIMARY KEY,
    storage_id  INTEGER NOT NULL REFERENCES storages(id),
    kind        INTEGER NOT NULL,
    name        TEXT NOT NULL,
    size        INTEGER NOT NULL,
    mtime       INTEGER NOT NULL,
    link_target TEXT
);
CREATE INDEX IF NOT EXISTS idx_entries_storage ON entries(storage_id);
CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name);
CREATE TABLE IF NOT EXISTS history (
    id         INTEGER PRIMARY KEY,
    entity_id  INTEGER NOT NULL REFERENCES entities(id),
    event      TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

pub struct IndexStore {
    conn: Mutex<Connection>,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // -- uuids ---------------------------------------------------------

    pub fn find_uuid(&self, value: &str) -> Result<Option<Uuid>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, value FROM uuids WHERE value = ?1")?;
        let row = stmt
            .query_row([value], |r| Ok(Uuid { id: r.get(0)?, value: r.get(1)? }))
            .ok();
        Ok(row)
    }

    /// Idempotent: returns the existing row for `value` if present,
    /// otherwise inserts a new one.
    pub fn new_uuid(&self, value: &str) -> Result<Uuid> {
        if let Some(existing) = self.find_uuid(value)? {
            return Ok(existing);
        }
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO uuids (value) VALUES (?1)", [value])?;
        Ok(Uuid { id: conn.last_insert_rowid(), value: value.to_string() })
    }

    // -- entities --------------------------------------------------------

    pub fn new_entity(&self, uuid_id: i64, created_at: i64) -> Result<Entity> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entities (uuid_id, created_at) VALUES (?1, ?2)",
            rusqlite::params![uuid_id, created_at],
        )?;
        Ok(Entity { id: conn.last_insert_rowid(), uuid_id, created_at, locked: false, entry_count: 0, total_size: 0 })
    }

    pub fn unlock_entity(&self, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE entities SET locked = 0 WHERE id = ?1", [entity_id])?;
        Ok(())
    }

    /// Removes the entity row only, leaving any storages/entries as
    /// historical orphans — distinct from [`Self::purge_entity`], which
    /// cascades.
    pub fn delete_entity(&self, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM entities WHERE id = ?1", [entity_id])?;
        Ok(())
    }

    /// Cascading delete: entity, its storages, and their entries.
    pub fn purge_entity(&self, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entries WHERE storage_id IN (SELECT id FROM storages WHERE entity_id = ?1)",
            [entity_id],
        )?;
        conn.execute("DELETE FROM storages WHERE entity_id = ?1", [entity_id])?;
        conn.execute("DELETE FROM entities WHERE id = ?1", [entity_id])?;
        Ok(())
    }

    /// Idempotent variant of [`Self::purge_entity`] — a second call on an
    /// already-purged id is a no-op rather than an error.
    pub fn prune_entity(&self, entity_id: i64) -> Result<()> {
        self.purge_entity(entity_id)
    }

    pub fn purge_uuid(&self, uuid_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let entity_ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM entities WHERE uuid_id = ?1")?;
            let rows = stmt.query_map([uuid_id], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        drop(conn);
        for entity_id in entity_ids {
            self.purge_entity(entity_id)?;
        }
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM uuids WHERE id = ?1", [uuid_id])?;
        Ok(())
    }

    pub fn prune_uuid(&self, uuid_id: i64) -> Result<()> {
        self.purge_uuid(uuid_id)
    }

    pub fn update_entity_infos(&self, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE entities SET
                entry_count = (SELECT COUNT(*) FROM entries WHERE storage_id IN (SELECT id FROM storages WHERE entity_id = ?1)),
                total_size  = (SELECT COALESCE(SUM(size), 0) FROM entries WHERE storage_id IN (SELECT id FROM storages WHERE entity_id = ?1))
             WHERE id = ?1",
            [entity_id],
        )?;
        Ok(())
    }

    pub fn new_history(&self, entity_id: i64, event: &str, created_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO history (entity_id, event, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![entity_id, event, created_at],
        )?;
        Ok(())
    }

    // -- storages --------------------------------------------------------

    pub fn new_storage(&self, entity_id: i64, name: &str, mode: StorageMode, created_at: i64) -> Result<Storage> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO storages (entity_id, name, state, mode, size, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            rusqlite::params![entity_id, name, StorageState::Create.as_i64(), mode.as_i64(), created_at],
        )?;
        Ok(Storage {
            id: conn.last_insert_rowid(),
            entity_id,
            name: name.to_string(),
            state: StorageState::Create,
            mode,
            size: 0,
            created_at,
        })
    }

    pub fn set_storage_state(&self, storage_id: i64, state: StorageState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE storages SET state = ?1 WHERE id = ?2", rusqlite::params![state.as_i64(), storage_id])?;
        Ok(())
    }

    pub fn update_storage(&self, storage_id: i64, size: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE storages SET size = ?1 WHERE id = ?2", rusqlite::params![size, storage_id])?;
        Ok(())
    }

    /// Recomputes `size` from the sum of its entries' sizes — used after
    /// a bulk insert rather than tracking a running total per `add_*`
    /// call.
    pub fn update_storage_infos(&self, storage_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE storages SET size = (SELECT COALESCE(SUM(size), 0) FROM entries WHERE storage_id = ?1) WHERE id = ?1",
            [storage_id],
        )?;
        Ok(())
    }

    pub fn purge_storage(&self, storage_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM entries WHERE storage_id = ?1", [storage_id])?;
        conn.execute("DELETE FROM storages WHERE id = ?1", [storage_id])?;
        Ok(())
    }

    pub fn purge_all_storages_by_id(&self, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entries WHERE storage_id IN (SELECT id FROM storages WHERE entity_id = ?1)",
            [entity_id],
        )?;
        conn.execute("DELETE FROM storages WHERE entity_id = ?1", [entity_id])?;
        Ok(())
    }

    pub fn purge_all_storages_by_name(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM entries WHERE storage_id IN (SELECT id FROM storages WHERE name = ?1)", [name])?;
        conn.execute("DELETE FROM storages WHERE name = ?1", [name])?;
        Ok(())
    }

    // -- entries -----------------------------------------------------------

    fn add_entry(&self, storage_id: i64, kind: EntryKind, name: &str, size: i64, mtime: i64, link_target: Option<&str>) -> Result<Entry> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entries (storage_id, kind, name, size, mtime, link_target) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![storage_id, model::kind_to_i64(kind), name, size, mtime, link_target],
        )?;
        Ok(Entry {
            id: conn.last_insert_rowid(),
            storage_id,
            kind,
            name: name.to_string(),
            size,
            mtime,
            link_target: link_target.map(str::to_string),
        })
    }

    pub fn add_file(&self, storage_id: i64, name: &str, size: i64, mtime: i64) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::File, name, size, mtime, None)
    }

    pub fn add_image(&self, storage_id: i64, name: &str, size: i64, mtime: i64) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::Image, name, size, mtime, None)
    }

    pub fn add_directory(&self, storage_id: i64, name: &str, mtime: i64) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::Directory, name, 0, mtime, None)
    }

    pub fn add_link(&self, storage_id: i64, name: &str, mtime: i64, target: &str) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::Link, name, 0, mtime, Some(target))
    }

    pub fn add_hardlink(&self, storage_id: i64, name: &str, mtime: i64, target: &str) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::Hardlink, name, 0, mtime, Some(target))
    }

    pub fn add_special(&self, storage_id: i64, name: &str, mtime: i64) -> Result<Entry> {
        self.add_entry(storage_id, EntryKind::Special, name, 0, mtime, None)
    }

    // -- query paths -------------------------------------------------------

    pub fn list_storages_for_entity(&self, entity_id: i64) -> Result<Vec<Storage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, name, state, mode, size, created_at FROM storages WHERE entity_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([entity_id], |r| {
            Ok(Storage {
                id: r.get(0)?,
                entity_id: r.get(1)?,
                name: r.get(2)?,
                state: StorageState::from_i64(r.get(3)?),
                mode: StorageMode::from_i64(r.get(4)?),
                size: r.get(5)?,
                created_at: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list_entries_for_storage(&self, storage_id: i64) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, storage_id, kind, name, size, mtime, link_target FROM entries WHERE storage_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([storage_id], |r| {
            Ok(Entry {
                id: r.get(0)?,
                storage_id: r.get(1)?,
                kind: model::kind_from_i64(r.get(2)?),
                name: r.get(3)?,
                size: r.get(4)?,
                mtime: r.get(5)?,
                link_target: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// The newest entries (by containing storage's `created_at`, then
    /// entry id) whose name matches a SQL `LIKE` pattern.
    pub fn list_newest_entries_matching(&self, pattern: &str, limit: i64) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.id, e.storage_id, e.kind, e.name, e.size, e.mtime, e.link_target
             FROM entries e JOIN storages s ON s.id = e.storage_id
             WHERE e.name LIKE ?1
             ORDER BY s.created_at DESC, e.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, limit], |r| {
            Ok(Entry {
                id: r.get(0)?,
                storage_id: r.get(1)?,
                kind: model::kind_from_i64(r.get(2)?),
                name: r.get(3)?,
                size: r.get(4)?,
                mtime: r.get(5)?,
                link_target: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// "Find UUID with execution statistics": the uuid row plus the
    /// entity count and total archived bytes across all its entities.
    pub fn find_uuid_with_stats(&self, value: &str) -> Result<Option<(Uuid, i64, i64)>> {
        let Some(uuid) = self.find_uuid(value)? else { return Ok(None) };
        let conn = self.conn.lock().unwrap();
        let (entity_count, total_size): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_size), 0) FROM entities WHERE uuid_id = ?1",
            [uuid.id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(Some((uuid, entity_count, total_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uuid_is_idempotent() {
        let store = IndexStore::in_memory().unwrap();
        let a = store.new_uuid("job-1").unwrap();
        let b = store.new_uuid("job-1").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn full_run_lifecycle() {
        let store = IndexStore::in_memory().unwrap();
        let uuid = store.new_uuid("nightly").unwrap();
        let entity = store.new_entity(uuid.id, 1_700_000_000).unwrap();
        let storage = store.new_storage(entity.id, "nightly-000001.bar", StorageMode::Auto, 1_700_000_000).unwrap();
        store.add_file(storage.id, "a.txt", 5, 1_700_000_000).unwrap();
        store.add_directory(storage.id, "d", 1_700_000_000).unwrap();
        store.set_storage_state(storage.id, StorageState::Ok).unwrap();
        store.update_storage_infos(storage.id).unwrap();
        store.update_entity_infos(entity.id).unwrap();

        let entries = store.list_entries_for_storage(storage.id).unwrap();
        assert_eq!(entries.len(), 2);

        let (_, entity_count, total_size) = store.find_uuid_with_stats("nightly").unwrap().unwrap();
        assert_eq!(entity_count, 1);
        assert_eq!(total_size, 5);
    }

    #[test]
    fn purge_storage_then_prune_entity_is_idempotent() {
        let store = IndexStore::in_memory().unwrap();
        let uuid = store.new_uuid("job").unwrap();
        let entity = store.new_entity(uuid.id, 0).unwrap();
        let storage = store.new_storage(entity.id, "job-000001.bar", StorageMode::Manual, 0).unwrap();
        store.add_file(storage.id, "x", 1, 0).unwrap();

        store.purge_storage(storage.id).unwrap();
        store.prune_entity(entity.id).unwrap();
        store.prune_entity(entity.id).unwrap();

        assert!(store.list_storages_for_entity(entity.id).unwrap().is_empty());
    }

    #[test]
    fn list_newest_entries_matching_filters_by_pattern() {
        let store = IndexStore::in_memory().unwrap();
        let uuid = store.new_uuid("job").unwrap();
        let entity = store.new_entity(uuid.id, 0).unwrap();
        let storage = store.new_storage(entity.id, "job-000001.bar", StorageMode::Manual, 0).unwrap();
        store.add_file(storage.id, "etc/passwd", 10, 0).unwrap();
        store.add_file(storage.id, "var/log/syslog", 20, 1).unwrap();

        let matches = store.list_newest_entries_matching("etc/%", 10).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "etc/passwd");
    }
}
