//! The library code for the `folio` content pipeline. `folio` turns Markdown
//! documents with `---`-delimited front matter into page records for an
//! external layout engine. Each document passes through four stages:
//!
//! 1. Loading the file and splitting off its front matter
//!    ([`crate::document`])
//! 2. Parsing the front matter ([`crate::frontmatter`])
//! 3. Rendering the body ([`crate::markdown`]), which resolves reference-style
//!    links against the document's definitions ([`crate::links`])
//! 4. Assembling the page ([`crate::page`])
//!
//! Rendering is the involved step. Fenced code blocks are the primary content
//! of the posts this pipeline was built for, so they are carried through
//! byte-for-byte, and link references are only substituted after the whole
//! body has been scanned because a definition may follow its first use.
//!
//! [`crate::build`] runs batches of documents on a worker pool, collecting
//! per-document failures rather than stopping at the first one, and builds the
//! category and tag listings ([`crate::index`]) once every page is done.
//! [`crate::write`] writes the results to disk.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod document;
pub mod frontmatter;
pub mod htmlrenderer;
pub mod index;
pub mod links;
pub mod markdown;
pub mod page;
pub mod write;
