//! Defines the [`Page`] type and [`assemble`], which combines a document's
//! front matter and rendered body into a page.

use crate::frontmatter::{FrontMatter, Value};
use crate::markdown::{RenderedBlock, RenderedBody, ResolvedLink};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Marks the end of a page's summary.
const FOLD_TAG: &str = "<!-- more -->";

/// A rendered page, ready to be handed to a layout engine. A page doesn't
/// retain the document it was built from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    /// The path of the source file relative to the source directory, less
    /// the extension, with `/` separators.
    pub id: String,

    pub title: String,
    pub date: NaiveDateTime,

    /// The name of the layout to apply. The layout itself is applied by an
    /// external engine.
    pub layout: String,

    pub categories: Vec<String>,
    pub tags: Vec<String>,

    /// Front matter keys without a dedicated field.
    pub extra: BTreeMap<String, Value>,

    /// The rendered body.
    pub body: String,

    pub blocks: Vec<RenderedBlock>,
    pub links: Vec<ResolvedLink>,
}

impl Page {
    /// Returns the body up to the first `<!-- more -->` marker and whether
    /// the marker was found.
    pub fn summary(&self) -> (&str, bool) {
        match self.body.find(FOLD_TAG) {
            Some(i) => (&self.body[..i], true),
            None => (&self.body, false),
        }
    }
}

/// Builds a [`Page`]. The front matter must name a title and a date, and a
/// layout must come from either the front matter or `default_layout`.
pub fn assemble(
    id: &str,
    front_matter: FrontMatter,
    body: RenderedBody,
    default_layout: Option<&str>,
) -> Result<Page, AssemblyError> {
    let FrontMatter {
        title,
        date,
        layout,
        categories,
        tags,
        extra,
    } = front_matter;

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or(AssemblyError::MissingField("title"))?;
    let date = date.ok_or(AssemblyError::MissingField("date"))?;
    let layout = layout
        .filter(|l| !l.trim().is_empty())
        .or_else(|| default_layout.map(str::to_owned))
        .ok_or(AssemblyError::MissingField("layout"))?;

    Ok(Page {
        id: id.to_owned(),
        title,
        date,
        layout,
        categories,
        tags,
        extra,
        body: body.html,
        blocks: body.blocks,
        links: body.links,
    })
}

/// Returned when a page can't be assembled because a required field is
/// absent.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}
