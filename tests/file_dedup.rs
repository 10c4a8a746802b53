use blockdedup::digest::{DigestFactory, DigestKind};
use blockdedup::{BlockingItem, FileDeduplicator, FileDeduplicatorConfig};
use rand::Rng;
use std::path::{Path, PathBuf};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random()).collect()
}

fn write_file(dir: &Path, contents: &[u8]) -> PathBuf {
    let path = dir.join(nanoid::nanoid!());
    std::fs::write(&path, contents).unwrap();
    path
}

#[test_log::test]
fn duplicate_content_across_many_directories_forms_one_group() {
    let root = tempfile::tempdir().unwrap();
    let payload = random_bytes(42);

    let mut expected = Vec::new();
    for _ in 0..5 {
        let sub = root.path().join(nanoid::nanoid!());
        std::fs::create_dir_all(&sub).unwrap();
        expected.push(write_file(&sub, &payload));
    }

    // An unrelated, uniquely-content file should not join the group.
    let sub = root.path().join(nanoid::nanoid!());
    std::fs::create_dir_all(&sub).unwrap();
    write_file(&sub, &random_bytes(42));

    let mut dedup = FileDeduplicator::new(FileDeduplicatorConfig::default()).unwrap();
    dedup.scan(root.path(), None).unwrap();

    let groups = dedup.duplicates(None);
    let duplicate_groups: Vec<_> = groups.into_iter().filter(|g| g.len() > 1).collect();
    assert_eq!(duplicate_groups.len(), 1);
    assert_eq!(duplicate_groups[0].len(), expected.len());
}

#[test_log::test]
fn custom_digest_chain_still_distinguishes_different_content() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), &random_bytes(4096 * 3));
    write_file(root.path(), &random_bytes(4096 * 3));

    let chain = vec![DigestKind::FileSize, DigestKind::Sha];
    let mut dedup = FileDeduplicator::new(FileDeduplicatorConfig {
        ignore_empty: false,
        blocking: Some(vec![BlockingItem::factory(DigestFactory::with_chain(chain))]),
    })
    .unwrap();
    dedup.scan(root.path(), None).unwrap();

    let groups = dedup.duplicates(None);
    assert!(groups.iter().all(|g| g.len() == 1));
    assert_eq!(dedup.blocking().len(), 2);
}

#[test_log::test]
fn progress_callback_reports_every_scanned_file() {
    let root = tempfile::tempdir().unwrap();
    for _ in 0..10 {
        write_file(root.path(), &random_bytes(16));
    }

    let mut seen = 0u64;
    let mut bytes_seen = 0u64;
    {
        let mut progress = |size: u64, ignored_unreadable: bool| {
            assert!(!ignored_unreadable);
            seen += 1;
            bytes_seen += size;
        };
        let mut dedup = FileDeduplicator::new(FileDeduplicatorConfig::default()).unwrap();
        dedup.scan(root.path(), Some(&mut progress)).unwrap();
    }

    assert_eq!(seen, 10);
    assert_eq!(bytes_seen, 160);
}

#[cfg(unix)]
#[test_log::test]
fn hardlinked_files_collapse_to_a_single_duplicate_entry() {
    let root = tempfile::tempdir().unwrap();
    let original = write_file(root.path(), &random_bytes(42));

    for _ in 0..4 {
        let link = root.path().join(nanoid::nanoid!());
        std::fs::hard_link(&original, &link).unwrap();
    }

    let mut dedup = FileDeduplicator::new(FileDeduplicatorConfig::default()).unwrap();
    dedup.scan(root.path(), None).unwrap();

    assert_eq!(dedup.hardlinks().len(), 1);
    assert_eq!(dedup.hardlinks()[0].len(), 5);

    let groups = dedup.duplicates(None);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 1);
}
