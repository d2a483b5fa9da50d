//! Builds the cross-document [`Index`]: listings of pages by category and by
//! tag. An index is only built once every page of a batch is available.

use crate::page::Page;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// A reference from a listing to a page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageRef {
    pub id: String,
    pub title: String,
    pub date: NaiveDateTime,

    /// The page body up to its fold marker.
    pub summary: String,

    /// Whether the summary is shorter than the body.
    pub summarized: bool,
}

impl From<&Page> for PageRef {
    fn from(page: &Page) -> PageRef {
        let (summary, summarized) = page.summary();
        PageRef {
            id: page.id.clone(),
            title: page.title.clone(),
            date: page.date,
            summary: summary.to_owned(),
            summarized,
        }
    }
}

/// The pages sharing a category or tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Listing {
    /// The name as first written in a page's front matter.
    pub name: String,

    /// The slugified name. Names with the same slug share a listing, so
    /// `macOS` and `MacOS` are one listing.
    pub slug: String,

    /// The listed pages, newest first.
    pub pages: Vec<PageRef>,
}

/// Category and tag listings keyed by slug.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Index {
    pub categories: BTreeMap<String, Listing>,
    pub tags: BTreeMap<String, Listing>,
}

impl Index {
    /// Indexes `pages`. A page appears at most once per listing even if its
    /// front matter repeats a name.
    pub fn build(pages: &[Page]) -> Index {
        let mut index = Index::default();
        for page in pages {
            add(&mut index.categories, &page.categories, page);
            add(&mut index.tags, &page.tags, page);
        }
        let listings =
            index.categories.values_mut().chain(index.tags.values_mut());
        for listing in listings {
            listing.pages.sort_by(|a, b| {
                b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id))
            });
        }
        index
    }
}

fn add(
    listings: &mut BTreeMap<String, Listing>,
    names: &[String],
    page: &Page,
) {
    for name in names {
        let slug = slug::slugify(name);
        if slug.is_empty() {
            continue;
        }
        let listing = listings.entry(slug.clone()).or_insert_with(|| Listing {
            name: name.clone(),
            slug,
            pages: Vec::new(),
        });
        if !listing.pages.iter().any(|p| p.id == page.id) {
            listing.pages.push(PageRef::from(page));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn page(id: &str, day: u32, categories: &[&str], tags: &[&str]) -> Page {
        Page {
            id: id.to_owned(),
            title: id.to_uppercase(),
            date: NaiveDate::from_ymd(2016, 5, day).and_hms(0, 0, 0),
            layout: String::from("post"),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            extra: BTreeMap::new(),
            body: String::from("<p>body</p>"),
            blocks: Vec::new(),
            links: Vec::new(),
        }
    }

    fn ids(listing: &Listing) -> Vec<&str> {
        listing.pages.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_build_index() {
        let pages = vec![
            page(
                "functors",
                1,
                &["Functional Programming"],
                &["swift", "swift"],
            ),
            page(
                "monads",
                5,
                &["functional programming"],
                &["haskell", "Swift"],
            ),
        ];
        let index = Index::build(&pages);

        let fp = &index.categories["functional-programming"];
        assert_eq!("Functional Programming", fp.name);
        assert_eq!(vec!["monads", "functors"], ids(fp));

        assert_eq!(
            vec!["haskell", "swift"],
            index.tags.keys().collect::<Vec<_>>()
        );
        assert_eq!(vec!["monads", "functors"], ids(&index.tags["swift"]));
        assert_eq!(vec!["monads"], ids(&index.tags["haskell"]));
    }

    #[test]
    fn test_empty_index() {
        assert_eq!(Index::default(), Index::build(&[]));
    }
}
