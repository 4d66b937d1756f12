use std::fs;

use mirror_core::AssetKind;
use mirror_engine::{create_run_folder, ensure_output_dir, AtomicFileWriter, StagedFile};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn run_folders_are_unique_and_laid_out() {
    let temp = TempDir::new().unwrap();

    let first = create_run_folder(temp.path(), "acme-widget").unwrap();
    let second = create_run_folder(temp.path(), "acme-widget").unwrap();
    let third = create_run_folder(temp.path(), "acme-widget").unwrap();

    assert_eq!(first, temp.path().join("acme-widget"));
    assert_eq!(second, temp.path().join("acme-widget-2"));
    assert_eq!(third, temp.path().join("acme-widget-3"));
    for kind in AssetKind::ALL {
        assert!(first.join(kind.folder()).is_dir(), "{} missing", kind.folder());
    }
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("local-index.html", "hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "local-index.html");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("local-index.html", "world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("index.html", "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("index.html").exists());
}

#[test]
fn staged_file_appears_only_on_commit() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("img").join("logo.png");

    let mut staged = StagedFile::create(target.clone()).unwrap();
    staged.write_chunk(b"abc").unwrap();
    staged.write_chunk(b"def").unwrap();
    assert_eq!(staged.written(), 6);
    assert!(!target.exists());

    staged.commit().unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"abcdef");
}

#[test]
fn dropped_staged_file_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("video").join("clip.mp4");

    let mut staged = StagedFile::create(target.clone()).unwrap();
    staged.write_chunk(b"partial").unwrap();
    drop(staged);

    assert!(!target.exists());
    assert_eq!(fs::read_dir(temp.path().join("video")).unwrap().count(), 0);
}
