//! Upload, fetch and delete scenarios against an in-process backup

mod common;

use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use common::{MemoryDirectory, StaticConnector};
use wolfshard::replication::{LocalReplica, ReplicationCoordinator};
use wolfshard::storage::{digest_bytes, LocalStore, Role};
use wolfshard::Error;

const BACKUP: &str = "10.0.0.2:9600";

struct Cluster {
    _primary_dir: TempDir,
    _backup_dir: TempDir,
    directory: Arc<MemoryDirectory>,
    coordinator: ReplicationCoordinator,
    primary: LocalStore,
    backup: LocalStore,
}

fn cluster() -> Cluster {
    let primary_dir = tempdir().unwrap();
    let backup_dir = tempdir().unwrap();
    let primary = LocalStore::new(primary_dir.path()).unwrap();
    let backup = LocalStore::new(backup_dir.path()).unwrap();

    let directory = MemoryDirectory::new();
    directory.assign_backup(7, BACKUP);
    let connector = StaticConnector::with(BACKUP, Arc::new(LocalReplica::new(BACKUP, backup.clone())));

    Cluster {
        coordinator: ReplicationCoordinator::new(primary.clone(), directory.clone(), connector),
        _primary_dir: primary_dir,
        _backup_dir: backup_dir,
        directory,
        primary,
        backup,
    }
}

#[tokio::test]
async fn upload_reaches_both_copies_and_local_corruption_is_repaired() {
    let c = cluster();

    c.coordinator.upload(7, "notes.txt", b"hello".to_vec()).await.unwrap();
    assert_eq!(c.primary.read(7, Role::Primary, "notes.txt").await.unwrap(), b"hello");
    assert_eq!(c.backup.read(7, Role::Backup, "notes.txt").await.unwrap(), b"hello");
    assert_eq!(
        c.primary.digest_of(7, Role::Primary, "notes.txt").await.unwrap(),
        c.backup.digest_of(7, Role::Backup, "notes.txt").await.unwrap()
    );

    c.primary.write(7, Role::Primary, "notes.txt", b"hellx".to_vec()).await.unwrap();

    assert_eq!(c.coordinator.fetch(7, "notes.txt").await.unwrap(), b"hello");
    assert_eq!(c.primary.read(7, Role::Primary, "notes.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn nested_round_trip() {
    let c = cluster();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    c.coordinator.upload(7, "a/b.txt", payload.clone()).await.unwrap();
    assert_eq!(c.coordinator.fetch(7, "a/b.txt").await.unwrap(), payload);
    assert_eq!(
        c.backup.digest_of(7, Role::Backup, "a/b.txt").await.unwrap(),
        digest_bytes(&payload)
    );
}

#[tokio::test]
async fn delete_is_idempotent() {
    let c = cluster();

    c.coordinator.delete(7, "never-existed.txt").await.unwrap();

    c.coordinator.upload(7, "gone.txt", b"x".to_vec()).await.unwrap();
    c.coordinator.delete(7, "gone.txt").await.unwrap();
    c.coordinator.delete(7, "gone.txt").await.unwrap();

    assert!(c.primary.read(7, Role::Primary, "gone.txt").await.unwrap_err().is_not_found());
    assert!(c.backup.read(7, Role::Backup, "gone.txt").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn missing_local_and_unreachable_backup_is_unrecoverable() {
    let c = cluster();
    c.coordinator.upload(7, "notes.txt", b"hello".to_vec()).await.unwrap();
    c.primary.delete(7, Role::Primary, "notes.txt").await.unwrap();

    // Reassign the user to a node nobody can reach
    c.directory.assign_backup(7, "10.0.0.99:9600");

    let err = c.coordinator.fetch(7, "notes.txt").await.unwrap_err();
    assert!(matches!(err, Error::FileUnrecoverable(_)));
}

#[tokio::test]
async fn unreachable_backup_degrades_to_local_and_heals_later() {
    let c = cluster();
    c.directory.assign_backup(7, "10.0.0.99:9600");

    c.coordinator.upload(7, "notes.txt", b"v2".to_vec()).await.unwrap();
    assert_eq!(c.coordinator.deficiencies().len(), 1);
    assert_eq!(c.coordinator.fetch(7, "notes.txt").await.unwrap(), b"v2");

    // The backup has an older copy; the flagged primary must win
    c.backup.write(7, Role::Backup, "notes.txt", b"v1".to_vec()).await.unwrap();
    c.directory.assign_backup(7, BACKUP);

    assert_eq!(c.coordinator.fetch(7, "notes.txt").await.unwrap(), b"v2");
    assert_eq!(c.backup.read(7, Role::Backup, "notes.txt").await.unwrap(), b"v2");
    assert!(c.coordinator.deficiencies().is_empty());
}

#[tokio::test]
async fn backup_lost_file_is_restored_from_primary() {
    let c = cluster();
    c.coordinator.upload(7, "notes.txt", b"hello".to_vec()).await.unwrap();
    c.backup.delete(7, Role::Backup, "notes.txt").await.unwrap();

    assert_eq!(c.coordinator.fetch(7, "notes.txt").await.unwrap(), b"hello");
    assert_eq!(c.backup.read(7, Role::Backup, "notes.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn users_cannot_reach_each_other() {
    let c = cluster();
    c.directory.assign_backup(8, BACKUP);
    c.coordinator.upload(8, "secret.txt", b"mine".to_vec()).await.unwrap();

    for path in ["../8/secret.txt", "/etc/passwd", "a/../../8/secret.txt"] {
        assert!(matches!(
            c.coordinator.fetch(7, path).await,
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            c.coordinator.upload(7, path, b"x".to_vec()).await,
            Err(Error::InvalidPath { .. })
        ));
    }
    assert_eq!(c.primary.read(8, Role::Primary, "secret.txt").await.unwrap(), b"mine");
}

#[tokio::test]
async fn concurrent_uploads_leave_one_whole_version() {
    let c = Arc::new(cluster());
    let versions: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

    let mut tasks = Vec::new();
    for data in versions.clone() {
        let c = Arc::clone(&c);
        tasks.push(tokio::spawn(async move {
            c.coordinator.upload(7, "race.bin", data).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = c.primary.read(7, Role::Primary, "race.bin").await.unwrap();
    assert!(versions.contains(&stored));
    let fetched = c.coordinator.fetch(7, "race.bin").await.unwrap();
    assert!(versions.contains(&fetched));
}
