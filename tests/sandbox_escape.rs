mod common;

use common::library;
use shelf_reader::ReaderError;
use std::fs;

#[test]
fn traversal_never_reads_outside_the_root() {
    let (dir, library) = library();
    fs::write(dir.path().join("outside.txt"), "secret").unwrap();
    fs::write(library.sandbox().root().join("inside.txt"), "fine").unwrap();

    for attempt in [
        "../outside.txt",
        "..\\outside.txt",
        "/../outside.txt",
        "....//outside.txt",
        "./../../outside.txt",
    ] {
        match library.read(attempt) {
            Err(err) => assert!(err.is_client_error(), "{attempt}: {err}"),
            Ok(outcome) => panic!("{attempt} resolved to {outcome:?}"),
        }
        assert!(library.download(attempt).is_err());
    }
    assert!(library.read("inside.txt").is_ok());
}

#[cfg(unix)]
#[test]
fn symlinks_out_of_the_root_are_rejected() {
    let (dir, library) = library();
    fs::write(dir.path().join("outside.txt"), "secret").unwrap();
    std::os::unix::fs::symlink(
        dir.path().join("outside.txt"),
        library.sandbox().root().join("link.txt"),
    )
    .unwrap();

    assert!(matches!(library.read("link.txt"), Err(ReaderError::PathEscape(_))));
    assert!(matches!(library.download("link.txt"), Err(ReaderError::PathEscape(_))));
}

#[test]
fn listing_hides_dotfiles_and_unreadable_files() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(root.join(".env"), "KEY=1").unwrap();
    fs::write(root.join("book.epub"), b"zip").unwrap();
    fs::write(root.join("image.raw"), [0u8; 64]).unwrap();

    let listing = library.list("", None).unwrap();
    let names: Vec<_> = listing
        .files
        .iter()
        .map(|f| f.descriptor.name.as_str())
        .collect();
    assert_eq!(names, vec!["book.epub"]);
    assert_eq!(listing.files[0].descriptor.type_label.as_str(), "EPUB");
}

#[test]
fn uploads_are_readable_only_through_the_prefix() {
    let (_dir, library) = library();
    let staged = library
        .uploads()
        .unwrap()
        .stage("draft notes.md", b"# Title\n\nBody")
        .unwrap();
    assert!(staged.read_path.starts_with("__temp__/draft_notes_"));
    assert!(library.read(&staged.read_path).is_ok());
    assert!(matches!(library.read(&staged.filename), Err(ReaderError::NotFound(_))));
}
