//! Defines the [`LinkReferences`] table used to resolve reference-style
//! Markdown links (`[text][label]`) and the [`Converter`] which rewrites
//! links between source documents into links between output pages.

use serde::Serialize;
use std::collections::HashMap;
use url::{ParseError, Url};

const MARKDOWN_EXTENSION: &str = ".md";
const HTML_EXTENSION: &str = ".html";

/// The destination of a link reference definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkReference {
    pub url: String,
    pub title: Option<String>,
}

/// A document's link reference definitions. Labels are compared
/// case-insensitively after trimming and collapsing inner whitespace, so
/// `[Monad Laws]`, `[monad  laws]` and `[ MONAD LAWS ]` are the same label.
#[derive(Clone, Debug, Default)]
pub struct LinkReferences {
    references: HashMap<String, LinkReference>,
}

impl LinkReferences {
    pub fn new() -> LinkReferences {
        LinkReferences::default()
    }

    /// Defines `label`. A later definition of the same label replaces an
    /// earlier one.
    pub fn define(&mut self, label: &str, url: &str, title: Option<&str>) {
        let key = normalize_label(label);
        let reference = LinkReference {
            url: url.to_owned(),
            title: title.map(str::to_owned),
        };
        if let Some(previous) = self.references.insert(key, reference) {
            log::debug!(
                "link reference `{}` redefined; replacing `{}`",
                label.trim(),
                previous.url
            );
        }
    }

    /// Looks up `label`, returning `None` when it was never defined.
    pub fn resolve(&self, label: &str) -> Option<&LinkReference> {
        self.references.get(&normalize_label(label))
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Returns the canonical form of a reference label.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Rewrites links that point at other source documents (`foo.md`) into
/// links to their rendered pages (`{site_root}/foo.html`). Any other
/// destination is returned exactly as written.
pub struct Converter<'a> {
    site_root: &'a Url,
    base: Url,
}

impl<'a> Converter<'a> {
    /// Constructs a new `Converter`
    ///
    /// # Arguments
    ///
    /// * `site_root` - the URL pages are published under. This should end in
    ///   a trailing slash.
    /// * `page_id` - the id of the page whose links are converted; relative
    ///   destinations are resolved against `{site_root}/{page_id}.html`.
    pub fn new(
        site_root: &'a Url,
        page_id: &str,
    ) -> Result<Converter<'a>, ParseError> {
        Ok(Converter {
            site_root,
            base: site_root.join(&format!("{}{}", page_id, HTML_EXTENSION))?,
        })
    }

    /// Converts a single link destination.
    pub fn convert(&self, destination: &str) -> Result<String, ParseError> {
        let absolute = match Url::parse(destination) {
            Ok(absolute) => absolute,
            Err(ParseError::RelativeUrlWithoutBase) => {
                self.base.join(destination)?
            }
            Err(e) => return Err(e),
        };

        if !absolute.path().ends_with(MARKDOWN_EXTENSION) {
            return Ok(destination.to_owned());
        }
        match self.site_root.make_relative(&absolute) {
            Some(relative)
                if !relative.starts_with("../")
                    && !relative.contains("://") =>
            {
                let mut page = absolute.clone();
                let path = absolute.path();
                page.set_path(&format!(
                    "{}{}",
                    path.trim_end_matches(MARKDOWN_EXTENSION),
                    HTML_EXTENSION
                ));
                Ok(page.to_string())
            }
            _ => Ok(destination.to_owned()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    type Result<T> = std::result::Result<T, ParseError>;

    #[test]
    fn test_labels_are_case_and_whitespace_insensitive() {
        let mut refs = LinkReferences::new();
        refs.define("Monad Laws", "https://wiki.haskell.org/Monad_laws", None);
        let wanted = Some(&LinkReference {
            url: String::from("https://wiki.haskell.org/Monad_laws"),
            title: None,
        });
        assert_eq!(wanted, refs.resolve("monad laws"));
        assert_eq!(wanted, refs.resolve("  MONAD\tLAWS "));
        assert_eq!(None, refs.resolve("monad"));
    }

    #[test]
    fn test_last_definition_wins() {
        let mut refs = LinkReferences::new();
        refs.define("a", "http://first.example", None);
        refs.define("A", "http://second.example", Some("Second"));
        assert_eq!(1, refs.len());
        assert_eq!(
            Some(&LinkReference {
                url: String::from("http://second.example"),
                title: Some(String::from("Second")),
            }),
            refs.resolve("a")
        );
    }

    #[test]
    fn test_convert_relative_post() -> Result<()> {
        fixture(
            "2016/monads",
            "https://example.org/blog/2016/functors.html",
            "functors.md",
        )
    }

    #[test]
    fn test_convert_relative_post_with_fragment() -> Result<()> {
        fixture(
            "2016/monads",
            "https://example.org/blog/2015/intro.html#bind",
            "../2015/intro.md#bind",
        )
    }

    #[test]
    fn test_convert_absolute_post() -> Result<()> {
        fixture(
            "monads",
            "https://example.org/blog/functors.html",
            "https://example.org/blog/functors.md",
        )
    }

    #[test]
    fn test_remote_markdown_untouched() -> Result<()> {
        fixture(
            "monads",
            "https://remote.org/README.md",
            "https://remote.org/README.md",
        )
    }

    #[test]
    fn test_other_links_untouched() -> Result<()> {
        fixture("monads", "http://x.com", "http://x.com")?;
        fixture("monads", "image.png", "image.png")?;
        fixture("monads", "#section", "#section")
    }

    #[test]
    fn test_escaping_site_root_untouched() -> Result<()> {
        fixture("monads", "../../elsewhere.md", "../../elsewhere.md")
    }

    fn fixture(page_id: &str, wanted: &str, target: &str) -> Result<()> {
        let site_root = Url::parse("https://example.org/blog/")?;
        let converter = Converter::new(&site_root, page_id)?;
        assert_eq!(wanted, converter.convert(target)?);
        Ok(())
    }
}
