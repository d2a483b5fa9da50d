//! Exports [`build_page`], which runs a single document through the pipeline
//! (load, parse front matter, render, assemble), and [`build_site`], which
//! discovers every document under the source directory and builds them on a
//! pool of worker threads.
//!
//! A failed document never aborts its batch: failures are collected into the
//! [`BuildReport`] alongside the pages that succeeded, unless the
//! configuration asks to fail fast.

use crate::config::Config;
use crate::document::{self, ReadError};
use crate::frontmatter::{self, FrontMatter, MetadataError};
use crate::index::Index;
use crate::markdown::{self, RenderError, RenderOptions};
use crate::page::{self, AssemblyError, Page};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// A document waiting to be built: its source path and page id.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub path: PathBuf,
    pub id: String,
}

/// A document that failed to build.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub error: Error,
}

impl fmt::Display for Failure {
    /// Displays a [`Failure`] as `{path}: {error}`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// The outcome of building a batch of documents.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// The pages that were built, newest first (ties broken by id).
    pub pages: Vec<Page>,

    /// The documents that failed, ordered by path.
    pub failures: Vec<Failure>,

    /// Documents that weren't attempted because an earlier document failed
    /// under `fail_fast`, ordered by path.
    pub skipped: Vec<PathBuf>,

    /// Category and tag listings over `pages`.
    pub index: Index,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Runs one document through every stage of the pipeline. The first failing
/// stage ends the build of the document.
pub fn build_page(source: &Source, config: &Config) -> Result<Page> {
    let document = document::load(&source.path)?;
    let split = document.split();

    let front_matter = match split.front_matter {
        Some(raw) => frontmatter::parse(
            raw,
            split.front_matter_line,
            &config.date_formats,
        )?,
        None => {
            log::debug!("`{}` has no front matter", source.path.display());
            FrontMatter::default()
        }
    };

    let body = markdown::render(
        split.body,
        split.body_line,
        &RenderOptions {
            heading_offset: config.heading_offset,
            site_root: config.site_root.as_ref(),
            page_id: &source.id,
        },
    )?;
    log::debug!(
        "rendered `{}`: {} blocks, {} links",
        source.path.display(),
        body.blocks.len(),
        body.links.len()
    );

    Ok(page::assemble(
        &source.id,
        front_matter,
        body,
        config.default_layout.as_deref(),
    )?)
}

/// Finds every source document under `config.source_directory` and builds
/// them.
pub fn build_site(
    config: &Config,
) -> std::result::Result<BuildReport, DiscoverError> {
    let sources = discover(&config.source_directory, &config.extensions)?;
    log::info!(
        "found {} documents in `{}`",
        sources.len(),
        config.source_directory.display()
    );
    Ok(build_documents(&sources, config))
}

/// Walks `dir` for files whose extension is one of `extensions`. Ids are
/// the path relative to `dir` without the extension, e.g. the id for
/// `{dir}/2016/monads.md` is `2016/monads`. Sources are ordered by path.
pub fn discover(
    dir: &Path,
    extensions: &[String],
) -> std::result::Result<Vec<Source>, DiscoverError> {
    use walkdir::WalkDir;

    let mut sources = Vec::new();
    let walk =
        WalkDir::new(dir).sort_by(|a, b| a.file_name().cmp(b.file_name()));
    for result in walk {
        let entry = result?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| extensions.iter().any(|x| x == e));
        if !matches {
            continue;
        }
        let relative = path
            .strip_prefix(dir)
            .map_err(|_| DiscoverError::InvalidPath(path.to_owned()))?
            .with_extension("");
        let id = relative
            .components()
            .map(|c| {
                c.as_os_str()
                    .to_str()
                    .ok_or_else(|| DiscoverError::InvalidPath(path.to_owned()))
            })
            .collect::<std::result::Result<Vec<&str>, DiscoverError>>()?
            .join("/");
        sources.push(Source {
            path: path.to_owned(),
            id,
        });
    }
    Ok(sources)
}

/// Builds `sources` on `config.threads()` workers. Documents are built
/// independently; the report is sorted so that the outcome doesn't depend on
/// scheduling.
pub fn build_documents(sources: &[Source], config: &Config) -> BuildReport {
    use crossbeam_channel::unbounded;

    let (tx, rx) = unbounded::<&Source>();
    let (results_tx, results_rx) =
        unbounded::<(&Source, Option<Result<Page>>)>();
    let stop = AtomicBool::new(false);
    let workers = config.threads().min(sources.len().max(1));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let results_tx = results_tx.clone();
            let stop = &stop;
            scope.spawn(move || {
                for source in rx {
                    if stop.load(Ordering::SeqCst) {
                        // `None` marks a skipped document.
                        let _ = results_tx.send((source, None));
                        continue;
                    }
                    let result = build_page(source, config);
                    if result.is_err() && config.fail_fast {
                        stop.store(true, Ordering::SeqCst);
                    }
                    let _ = results_tx.send((source, Some(result)));
                }
            });
        }

        for source in sources {
            // The receivers outlive this loop, so sending can't fail.
            let _ = tx.send(source);
        }
        drop(tx);
    });
    drop(results_tx);

    let mut report = BuildReport::default();
    for (source, result) in results_rx {
        match result {
            Some(Ok(page)) => {
                log::debug!("built `{}`", source.path.display());
                report.pages.push(page);
            }
            Some(Err(error)) => {
                log::warn!("{}: {}", source.path.display(), error);
                report.failures.push(Failure {
                    path: source.path.clone(),
                    error,
                });
            }
            None => report.skipped.push(source.path.clone()),
        }
    }

    report
        .pages
        .sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));
    report.skipped.sort();
    report.index = Index::build(&report.pages);

    log::info!(
        "built {} pages, {} failed, {} skipped",
        report.pages.len(),
        report.failures.len(),
        report.skipped.len()
    );
    report
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a single page. There is one variant per
/// pipeline stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the document can't be read.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Returned for malformed front matter.
    #[error("front matter: {0}")]
    Metadata(#[from] MetadataError),

    /// Returned for body rendering problems, chiefly unresolved link
    /// references.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Returned when required fields are absent after rendering.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl Error {
    /// The source line the error refers to, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Metadata(err) => Some(err.line),
            Error::Render(RenderError::UnresolvedReference(err)) => {
                Some(err.line)
            }
            Error::Render(RenderError::Link { line, .. }) => Some(*line),
            _ => None,
        }
    }
}

/// Returned when the source directory can't be walked.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("walking source directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("invalid source path `{}`", .0.display())]
    InvalidPath(PathBuf),
}
