mod common;

use common::{library, write_zip};
use shelf_reader::fb2::UNKNOWN_LANGUAGE;
use shelf_reader::{ReadOutcome, ReaderError, RenderKind};
use std::fs;

#[test]
fn pdf_is_located_not_parsed() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(root.join("paper.pdf"), b"%PDF-1.4 whatever").unwrap();
    match library.read("paper.pdf").unwrap() {
        ReadOutcome::Pdf { path } => assert_eq!(path, root.join("paper.pdf")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn fb2_reads_to_html() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(
        root.join("tale.fb2"),
        r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description><title-info><book-title>Tale</book-title></title-info></description>
  <body><section><title><p>I</p></title><p>Once <strong>upon</strong> a time</p></section></body>
</FictionBook>"#,
    )
    .unwrap();
    match library.read("tale.fb2").unwrap() {
        ReadOutcome::Fb2(doc) => {
            assert_eq!(doc.metadata.book_title, "Tale");
            assert_eq!(doc.metadata.lang, UNKNOWN_LANGUAGE);
            assert!(doc.content.starts_with("<div><h3><p>I</p></h3>"));
            assert!(doc.content.contains("<p>Once <strong>upon</strong> a time</p>"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn broken_fb2_is_a_parse_error() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(root.join("bad.fb2"), "<FictionBook><body><p>oops</body>").unwrap();
    let err = library.read("bad.fb2").unwrap_err();
    assert!(matches!(err, ReaderError::Fb2Parse(_)));
    assert!(!err.is_client_error());
}

#[test]
fn html_falls_back_to_gbk() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    let (bytes, _, _) = encoding_rs::GBK.encode("<p>中文网页</p>");
    fs::write(root.join("page.html"), &bytes).unwrap();
    match library.read("page.html").unwrap() {
        ReadOutcome::Html { content } => assert_eq!(content, "<p>中文网页</p>"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn code_is_tagged_with_language() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::create_dir(root.join("src")).unwrap();
    fs::write(root.join("src/app.js"), "let a = 1;\n\n\nlet b = 2;").unwrap();
    match library.read("src/app.js").unwrap() {
        ReadOutcome::Text(prepared) => {
            assert_eq!(prepared.kind, RenderKind::Code);
            assert_eq!(prepared.language, Some("javascript"));
            assert_eq!(prepared.content, "let a = 1;\n\n\nlet b = 2;");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn comic_pages_are_listed_and_fetched() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    write_zip(
        &root.join("comics/My Comic.cbz"),
        &[
            ("page10.jpg", b"ten"),
            ("page2.png", b"two"),
            ("__MACOSX/page2.png", b"junk"),
            ("extras/", b""),
            ("notes.txt", b"not a page"),
            ("cover art.webp", b"cover"),
        ],
    );

    let archive = library.comic_pages("comics/My Comic.cbz").unwrap();
    assert_eq!(archive.pages, vec!["cover art.webp", "page10.jpg", "page2.png"]);

    let page = library
        .comic_page("comics/My%20Comic.cbz", "cover%20art.webp")
        .unwrap();
    assert_eq!(page.bytes, b"cover");
    assert_eq!(page.mime, "image/webp");

    assert!(matches!(
        library.comic_page("comics/My%20Comic.cbz", "missing.jpg"),
        Err(ReaderError::NotFound(_))
    ));
    assert!(matches!(
        library.comic_page("comics/My%20Comic.cbz", "%2E%2E%2Fsecret.jpg"),
        Err(ReaderError::PathEscape(_))
    ));

    match library.read("comics/My Comic.cbz").unwrap() {
        ReadOutcome::Comic(comic) => assert_eq!(comic.page_count(), 3),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn corrupt_comic_is_reported() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(root.join("broken.cbz"), b"definitely not a zip").unwrap();
    assert!(matches!(
        library.read("broken.cbz"),
        Err(ReaderError::CorruptArchive { .. })
    ));
}

#[test]
fn repeated_reads_are_identical() {
    let (_dir, library) = library();
    let root = library.sandbox().root().to_path_buf();
    fs::write(root.join("story.txt"), "第一段\n\n第二段").unwrap();
    let first = library.read("story.txt").unwrap();
    let second = library.read("story.txt").unwrap();
    assert_eq!(first, second);
}
