//! End-to-end tests: a project directory of posts is built and written.

use folio::build::{build_site, Error};
use folio::config::{Config, PROJECT_FILE};
use folio::document::Document;
use folio::markdown::{self, BlockKind, RenderError, RenderOptions};
use folio::write::{Writer, INDEX_FILE};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MONADS: &str = r#"---
layout: post
title:  "Monads in Swift"
date:   2016-05-05 13:52
categories: [programming]
tags: [swift, haskell, monads]
---
Haskell's [bind][] operator has a familiar shape:

```haskell
(>>=) :: Monad m => m a -> (a -> m b) -> m b
```

<!-- more -->

## Optionals

In Swift, `flatMap` on `Optional<T>` plays the same role:

```swift
extension Optional {
    func bind<U>(_ f: (Wrapped) -> U?) -> U? {
        switch self {
        case .some(let x): return f(x)
        case .none: return nil
        }
    }
}
```

> See the [Swift book][swift] for more.

[bind]: https://wiki.haskell.org/Monad "Monads"
[Swift]: https://docs.swift.org/swift-book/
"#;

const SWIFT_SNIPPET: &str = r#"extension Optional {
    func bind<U>(_ f: (Wrapped) -> U?) -> U? {
        switch self {
        case .some(let x): return f(x)
        case .none: return nil
        }
    }
}
"#;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(PROJECT_FILE), "threads: 2\n").unwrap();
    for (relative, contents) in files {
        let path = dir.path().join("posts").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn config(dir: &Path) -> Config {
    Config::from_directory(dir).unwrap()
}

#[test]
fn test_build_monads_post() {
    let dir = project(&[("2016/monads.md", MONADS)]);
    let report = build_site(&config(dir.path())).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let page = &report.pages[0];
    assert_eq!("2016/monads", page.id);
    assert_eq!("Monads in Swift", page.title);
    assert_eq!("post", page.layout);
    assert_eq!(vec!["swift", "haskell", "monads"], page.tags);

    let code: Vec<(Option<&str>, &str)> = page
        .blocks
        .iter()
        .filter_map(|b| match &b.block.kind {
            BlockKind::FencedCode {
                language, content, ..
            } => Some((language.as_deref(), content.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        vec![
            (
                Some("haskell"),
                "(>>=) :: Monad m => m a -> (a -> m b) -> m b\n"
            ),
            (Some("swift"), SWIFT_SNIPPET),
        ],
        code
    );

    assert!(page.body.contains(
        r#"<a href="https://wiki.haskell.org/Monad" title="Monads">bind</a>"#
    ));
    assert!(page.body.contains(
        r#"<a href="https://docs.swift.org/swift-book/">Swift book</a>"#
    ));
    assert_eq!(
        vec!["bind", "swift"],
        page.links.iter().map(|l| l.label.as_str()).collect::<Vec<_>>()
    );

    let (summary, summarized) = page.summary();
    assert!(summarized);
    assert!(summary.contains("language-haskell"));
    assert!(!summary.contains("Optionals"));

    assert_eq!(
        vec!["2016/monads"],
        report.index.tags["haskell"]
            .pages
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_partial_failure_report() {
    let dir = project(&[
        ("bad.md", "---\ntitle: Broken\ndate: yesterday\n---\nbody\n"),
        ("good.md", MONADS),
    ]);
    let config = config(dir.path());
    let report = build_site(&config).unwrap();

    assert_eq!(1, report.failures.len());
    assert!(report.failures[0].path.ends_with("bad.md"));
    match &report.failures[0].error {
        Error::Metadata(err) => assert_eq!(3, err.line),
        other => panic!("wanted a metadata error, got {:?}", other),
    }
    assert_eq!(
        vec!["good"],
        report.pages.iter().map(|p| p.id.as_str()).collect::<Vec<_>>()
    );

    Writer {
        output_directory: &config.output_directory,
    }
    .write_report(&report)
    .unwrap();
    assert!(config.output_directory.join("good.yaml").is_file());
    assert!(!config.output_directory.join("bad.yaml").exists());
    assert!(config.output_directory.join(INDEX_FILE).is_file());
}

#[test]
fn test_unresolved_reference_fails_document() {
    let dir = project(&[(
        "dangling.md",
        "---\ntitle: X\ndate: 2016-05-05\n---\nSee [here][missing].\n",
    )]);
    let report = build_site(&config(dir.path())).unwrap();
    assert!(report.pages.is_empty());
    match &report.failures[0].error {
        Error::Render(RenderError::UnresolvedReference(err)) => {
            assert_eq!("missing", err.label);
            assert_eq!(5, err.line);
        }
        other => panic!("wanted an unresolved reference, got {:?}", other),
    }
}

#[test]
fn test_document_without_front_matter() {
    let text = "Just [a link][x].\n\n[x]: http://x.com\n";
    let doc = Document::new("bare.md", text);
    let split = doc.split();
    assert_eq!(None, split.front_matter);
    assert_eq!(text, split.body);

    let body =
        markdown::render(split.body, split.body_line, &RenderOptions::default())
            .unwrap();
    assert_eq!(
        "<p>Just <a href=\"http://x.com\">a link</a>.</p>\n",
        body.html
    );
}

#[test]
fn test_front_matter_without_opening_delimiter() {
    let dir = project(&[(
        "x.md",
        "title: X\ndate: 2016-05-05 13:52\n---\n\
         See [here][a].\n\n[a]: http://x.com \"X\"",
    )]);
    let report = build_site(&config(dir.path())).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(
        "<p>See <a href=\"http://x.com\" title=\"X\">here</a>.</p>\n",
        report.pages[0].body
    );
}

#[test]
fn test_code_in_link_text_and_lists() {
    let dir = project(&[(
        "bind.md",
        "---\ntitle: Bind\ndate: 2016-05-05\n---\n\
         Haskell spells it [`>>=`][bind].\n\n\
         1. Index a grid:\n\n       let m = grid[0][1]\n\n\
         2. Done.\n\n[bind]: https://wiki.haskell.org/Monad\n",
    )]);
    let report = build_site(&config(dir.path())).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let body = &report.pages[0].body;
    assert!(body.contains(
        r#"<a href="https://wiki.haskell.org/Monad"><code>&gt;&gt;=</code></a>"#
    ));
    assert!(body.contains("<pre><code>let m = grid[0][1]\n</code></pre>"));
    assert_eq!(1, body.matches("<ol>").count());
}

#[test]
fn test_rebuild_is_identical() {
    let dir = project(&[("monads.md", MONADS)]);
    let config = config(dir.path());
    let first = build_site(&config).unwrap();
    let second = build_site(&config).unwrap();
    assert_eq!(first.pages, second.pages);
}
