use barc::archive::{ArchiveReader, ArchiveWriter, Metadata, ReaderCrypt, WriterOptions};
use barc::index::{IndexStore, StorageMode};
use barc::storage::LocalBackend;
use barc::{ArchiveType, CompressAlgorithm, JobListLock};

fn metadata(size: u64) -> Metadata {
    Metadata { size, mtime: 1_700_000_000, atime: 1_700_000_000, ctime: 1_700_000_000, uid: 0, gid: 0, mode: 0o644, major: None, minor: None, filesystem_type: None }
}

#[test]
fn writes_a_small_archive_and_reads_it_back() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Box::new(LocalBackend::new(dir.path()));
    let mut options = WriterOptions::new("nightly");
    options.compression = CompressAlgorithm::Deflate;

    let payload = b"the quick brown fox jumps over the lazy dog".repeat(50);
    let mut writer = ArchiveWriter::new(storage, options, None);
    writer.add_directory("/etc", metadata(0)).unwrap();
    writer.add_file("/etc/passwd", metadata(payload.len() as u64), &payload).unwrap();
    let (volumes, _incremental) = writer.close().unwrap();
    assert_eq!(volumes.len(), 1);

    let storage = Box::new(LocalBackend::new(dir.path()));
    let mut reader = ArchiveReader::open(storage, "nightly", CompressAlgorithm::Deflate, ReaderCrypt::None).unwrap();

    let (first, first_data) = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.name, "/etc");
    assert!(first_data.is_empty());

    let (second, second_data) = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.name, "/etc/passwd");
    assert_eq!(second_data, payload);

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn index_store_tracks_entity_and_storage_created_by_a_run() {
    let index = IndexStore::in_memory().unwrap();
    let uuid = index.new_uuid("b16c1a3e-0000-4000-8000-000000000000").unwrap();
    let entity = index.new_entity(uuid.id, 1_700_000_000).unwrap();
    let storage = index.new_storage(entity.id, "nightly-000001.bar", StorageMode::Auto, 1_700_000_000).unwrap();
    index.add_file(storage.id, "/etc/passwd", 2048, 1_700_000_000).unwrap();
    index.update_storage_infos(storage.id).unwrap();
    index.update_entity_infos(entity.id).unwrap();

    let entries = index.list_entries_for_storage(storage.id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, 2048);
}

#[test]
fn job_lifecycle_runs_through_the_engine() {
    let _ = tracing_subscriber::fmt::try_init();
    let jobs = JobListLock::new();
    let uuid = jobs.new_job("nightly", "/backups/nightly");
    jobs.start_job(&uuid, ArchiveType::Normal).unwrap();
    jobs.mark_running(&uuid).unwrap();
    jobs.mark_done(&uuid).unwrap();
    assert_eq!(jobs.get_job(&uuid).unwrap().state, barc::JobState::Done);

    // A finished job can be re-scheduled.
    jobs.start_job(&uuid, ArchiveType::Normal).unwrap();
    assert_eq!(jobs.get_job(&uuid).unwrap().state, barc::JobState::Waiting);
}
