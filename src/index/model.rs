//! Row types for the index store's four-level catalogue: a UUID names an
//! external identity (a job, a client), an Entity is one archive run
//! under that UUID, a Storage is one produced volume, and an Entry is
//! one archived item within a storage.

use crate::archive::entry::EntryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    None,
    Ok,
    Create,
    UpdateRequested,
    Update,
    Error,
}

impl StorageState {
    pub fn as_i64(self) -> i64 {
        match self {
            StorageState::None => 0,
            StorageState::Ok => 1,
            StorageState::Create => 2,
            StorageState::UpdateRequested => 3,
            StorageState::Update => 4,
            StorageState::Error => 5,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => StorageState::Ok,
            2 => StorageState::Create,
            3 => StorageState::UpdateRequested,
            4 => StorageState::Update,
            5 => StorageState::Error,
            _ => StorageState::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Manual,
    Auto,
}

impl StorageMode {
    pub fn as_i64(self) -> i64 {
        match self {
            StorageMode::Manual => 0,
            StorageMode::Auto => 1,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => StorageMode::Auto,
            _ => StorageMode::Manual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Uuid {
    pub id: i64,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: i64,
    pub uuid_id: i64,
    pub created_at: i64,
    pub locked: bool,
    pub entry_count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pub id: i64,
    pub entity_id: i64,
    pub name: String,
    pub state: StorageState,
    pub mode: StorageMode,
    pub size: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub storage_id: i64,
    pub kind: EntryKind,
    pub name: String,
    pub size: i64,
    pub mtime: i64,
    pub link_target: Option<String>,
}

pub(super) fn kind_to_i64(kind: EntryKind) -> i64 {
    match kind {
        EntryKind::File => 0,
        EntryKind::Image => 1,
        EntryKind::Directory => 2,
        EntryKind::Link => 3,
        EntryKind::Hardlink => 4,
        EntryKind::Special => 5,
    }
}

pub(super) fn kind_from_i64(v: i64) -> EntryKind {
    match v {
        1 => EntryKind::Image,
        2 => EntryKind::Directory,
        3 => EntryKind::Link,
        4 => EntryKind::Hardlink,
        5 => EntryKind::Special,
        _ => EntryKind::File,
    }
}
