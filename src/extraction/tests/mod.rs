use crate::error::Error;
use crate::extraction::*;
use crate::types::{ArchiveFormat, ExtractionTarget};
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Build an in-memory ZIP with stored (uncompressed) entries; names ending in `/` become directories
fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);

    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Every regular file under `dir`, relative to it, with its content
fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

fn bundle() -> Vec<u8> {
    zip_bytes(&[
        ("a.json", br#"{"welcome":"Bienvenue"}"#),
        ("sub/b.json", br#"{"bye":"Au revoir"}"#),
    ])
}

#[test]
fn test_detect_archive_format_zip() {
    assert_eq!(detect_archive_format(&bundle()), Some(ArchiveFormat::Zip));
    assert_eq!(detect_archive_format(&zip_bytes(&[])), Some(ArchiveFormat::Zip));
}

#[test]
fn test_detect_archive_format_unknown() {
    assert_eq!(detect_archive_format(b"<html>Access Denied</html>"), None);
    assert_eq!(detect_archive_format(b""), None);
}

#[test]
fn test_extract_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path());

    let written = ArchiveExtractor::extract(&bundle(), &target).unwrap();

    let expected: BTreeSet<PathBuf> = [
        temp_dir.path().join("a.json"),
        temp_dir.path().join("sub").join("b.json"),
    ]
    .into_iter()
    .collect();
    assert_eq!(written, expected);

    assert_eq!(
        snapshot(temp_dir.path()),
        vec![
            (PathBuf::from("a.json"), br#"{"welcome":"Bienvenue"}"#.to_vec()),
            (
                PathBuf::from("sub").join("b.json"),
                br#"{"bye":"Au revoir"}"#.to_vec()
            ),
        ]
    );
}

#[test]
fn test_extract_creates_missing_target_directory() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path().join("locales").join("fr"));

    ArchiveExtractor::extract(&bundle(), &target).unwrap();

    assert!(temp_dir.path().join("locales/fr/a.json").is_file());
}

#[test]
fn test_extract_twice_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path());

    let first = ArchiveExtractor::extract(&bundle(), &target).unwrap();
    let after_first = snapshot(temp_dir.path());

    let second = ArchiveExtractor::extract(&bundle(), &target).unwrap();
    let after_second = snapshot(temp_dir.path());

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[test]
fn test_extract_replaces_stale_content() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("a.json"), b"stale and much longer content").unwrap();

    ArchiveExtractor::extract(&bundle(), &ExtractionTarget::new(temp_dir.path())).unwrap();

    assert_eq!(
        std::fs::read(temp_dir.path().join("a.json")).unwrap(),
        br#"{"welcome":"Bienvenue"}"#
    );
}

#[test]
fn test_extract_without_overwrite_refuses_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("a.json"), b"keep me").unwrap();
    let target = ExtractionTarget::new(temp_dir.path()).with_overwrite(false);

    let result = ArchiveExtractor::extract(&bundle(), &target);

    match result {
        Err(Error::ExtractionFailed { path, .. }) => assert_eq!(path, PathBuf::from("a.json")),
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(temp_dir.path().join("a.json")).unwrap(),
        b"keep me"
    );
}

#[test]
fn test_extract_rejects_directory_traversal() {
    let outer = TempDir::new().unwrap();
    let target_dir = outer.path().join("a").join("b");
    let archive = zip_bytes(&[
        ("good.json", b"{}"),
        ("../../evil.json", b"{\"pwned\":true}"),
    ]);

    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(&target_dir));

    match result {
        Err(Error::ExtractionFailed { path, reason }) => {
            assert_eq!(path, PathBuf::from("../../evil.json"));
            assert!(reason.contains("escapes"), "reason: {reason}");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert!(!outer.path().join("evil.json").exists());
    assert!(!target_dir.join("evil.json").exists());
    // Not transactional: the entry before the bad one stays
    assert!(target_dir.join("good.json").is_file());
}

#[test]
fn test_extract_rejects_absolute_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive = zip_bytes(&[("/tmp/evil.json", b"{}")]);

    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path()));

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
    assert!(snapshot(temp_dir.path()).is_empty());
}

#[cfg(unix)]
#[test]
fn test_extract_rejects_symlinked_parent() {
    let outer = TempDir::new().unwrap();
    let target_dir = outer.path().join("target");
    let elsewhere = outer.path().join("elsewhere");
    std::fs::create_dir_all(&target_dir).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();
    std::os::unix::fs::symlink(&elsewhere, target_dir.join("link")).unwrap();

    let archive = zip_bytes(&[("link/evil.json", b"{}")]);
    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(&target_dir));

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
    assert!(!elsewhere.join("evil.json").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_nested_entry_through_symlink_creates_nothing_outside() {
    let outer = TempDir::new().unwrap();
    let target_dir = outer.path().join("target");
    let elsewhere = outer.path().join("elsewhere");
    std::fs::create_dir_all(&target_dir).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();
    std::os::unix::fs::symlink("../elsewhere", target_dir.join("link")).unwrap();

    let archive = zip_bytes(&[("link/sub/deeper/evil.json", b"{}")]);
    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(&target_dir));

    match result {
        Err(Error::ExtractionFailed { path, reason }) => {
            assert_eq!(path, PathBuf::from("link/sub/deeper/evil.json"));
            assert!(reason.contains("escapes"), "reason: {reason}");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert!(!elsewhere.join("sub").exists(), "directory created outside target");
}

#[cfg(unix)]
#[test]
fn test_extract_directory_entry_through_symlink_creates_nothing_outside() {
    let outer = TempDir::new().unwrap();
    let target_dir = outer.path().join("target");
    let elsewhere = outer.path().join("elsewhere");
    std::fs::create_dir_all(&target_dir).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();
    std::os::unix::fs::symlink(&elsewhere, target_dir.join("link")).unwrap();

    let archive = zip_bytes(&[("link/sub/", b"")]);
    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(&target_dir));

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
    assert!(!elsewhere.join("sub").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_follows_symlink_that_stays_inside_target() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("real")).unwrap();
    std::os::unix::fs::symlink("real", temp_dir.path().join("alias")).unwrap();

    let archive = zip_bytes(&[("alias/nested/fr.json", b"{}")]);
    ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path())).unwrap();

    assert!(temp_dir.path().join("real/nested/fr.json").is_file());
}

#[test]
fn test_extract_file_blocking_parent_directory() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("locales"), b"not a directory").unwrap();

    let archive = zip_bytes(&[("locales/fr.json", b"{}")]);
    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path()));

    match result {
        Err(Error::ExtractionFailed { path, reason }) => {
            assert_eq!(path, PathBuf::from("locales/fr.json"));
            assert!(reason.contains("in the way"), "reason: {reason}");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
}

#[test]
fn test_extract_unusable_target_reports_extraction_failure() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("out");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();

    let result = ArchiveExtractor::extract(&bundle(), &ExtractionTarget::new(&blocker));

    match result {
        Err(Error::ExtractionFailed { path, reason }) => {
            assert_eq!(path, blocker);
            assert!(reason.contains("destination"), "reason: {reason}");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
}

#[test]
fn test_extract_malformed_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path().join("out"));

    let result = ArchiveExtractor::extract(b"definitely not a zip", &target);

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
    assert!(!target.directory.exists(), "target must not be created");
}

#[test]
fn test_extract_truncated_zip() {
    let temp_dir = TempDir::new().unwrap();
    let mut archive = bundle();
    archive.truncate(archive.len() / 2);

    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path()));

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
}

#[test]
fn test_extract_corrupt_entry_keeps_earlier_files() {
    let temp_dir = TempDir::new().unwrap();
    let mut archive = zip_bytes(&[
        ("first.json", b"FIRST-ENTRY-CONTENT"),
        ("second.json", b"SECOND-ENTRY-CONTENT"),
    ]);

    // Flip a byte of the stored second entry so its CRC no longer matches
    let needle = b"SECOND-ENTRY-CONTENT";
    let offset = archive
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    archive[offset] ^= 0xFF;

    let result = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path()));

    match result {
        Err(Error::ExtractionFailed { path, .. }) => assert_eq!(path, PathBuf::from("second.json")),
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert_eq!(
        snapshot(temp_dir.path()),
        vec![(PathBuf::from("first.json"), b"FIRST-ENTRY-CONTENT".to_vec())],
        "no torn second file, first file kept"
    );
}

#[test]
fn test_extract_only_named_entries() {
    let temp_dir = TempDir::new().unwrap();
    let archive = zip_bytes(&[
        ("en.json", b"{\"welcome\":\"Welcome\"}"),
        ("fr.json", b"{\"welcome\":\"Bienvenue\"}"),
    ]);
    let target = ExtractionTarget::new(temp_dir.path()).only(["fr.json"]);

    let written = ArchiveExtractor::extract(&archive, &target).unwrap();

    assert_eq!(
        written.into_iter().collect::<Vec<_>>(),
        vec![temp_dir.path().join("fr.json")]
    );
    assert!(!temp_dir.path().join("en.json").exists());
}

#[test]
fn test_extract_missing_named_entry_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path().join("out")).only(["a.json", "de.json"]);

    let result = ArchiveExtractor::extract(&bundle(), &target);

    match result {
        Err(Error::ExtractionFailed { path, reason }) => {
            assert_eq!(path, PathBuf::from("de.json"));
            assert!(reason.contains("not found"));
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert!(!target.directory.exists());
}

#[test]
fn test_extract_directory_entries_are_not_reported() {
    let temp_dir = TempDir::new().unwrap();
    let archive = zip_bytes(&[("locales/", b""), ("locales/fr.json", b"{}")]);

    let written = ArchiveExtractor::extract(&archive, &ExtractionTarget::new(temp_dir.path())).unwrap();

    assert_eq!(written.len(), 1);
    assert!(written.contains(&temp_dir.path().join("locales").join("fr.json")));
}

#[test]
fn test_extract_refuses_to_replace_directory_with_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("a.json")).unwrap();

    let result = ArchiveExtractor::extract(&bundle(), &ExtractionTarget::new(temp_dir.path()));

    assert!(matches!(result, Err(Error::ExtractionFailed { .. })));
}

#[tokio::test]
async fn test_extract_async_runs_on_blocking_pool() {
    let temp_dir = TempDir::new().unwrap();
    let target = ExtractionTarget::new(temp_dir.path());

    let written = ArchiveExtractor::extract_async(bundle(), target).await.unwrap();

    assert_eq!(written.len(), 2);
}
