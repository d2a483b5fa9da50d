//! Writes the pages of a [`BuildReport`] to disk as YAML records for an
//! external layout engine.

use crate::build::BuildReport;
use crate::page::Page;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The file the cross-document index is written to. The leading underscore
/// keeps it clear of page records, which are named after page ids.
pub const INDEX_FILE: &str = "_index.yaml";

/// Responsible for writing page records and the index into the output
/// directory.
pub struct Writer<'a> {
    /// Page records are written to `{output_directory}/{page_id}.yaml` and
    /// the index to `{output_directory}/_index.yaml`.
    pub output_directory: &'a Path,
}

impl Writer<'_> {
    /// Writes every page of `report` and its index. Failed documents have no
    /// page and so produce no output.
    pub fn write_report(&self, report: &BuildReport) -> Result<()> {
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();
        for page in &report.pages {
            let path = self.page_path(page);
            if let Some(dir) = path.parent() {
                if seen_dirs.insert(dir.to_owned()) {
                    std::fs::create_dir_all(dir).map_err(|err| Error::Io {
                        path: dir.to_owned(),
                        err,
                    })?;
                }
            }
            write_record(&path, page)?;
        }

        std::fs::create_dir_all(self.output_directory).map_err(|err| Error::Io {
            path: self.output_directory.to_owned(),
            err,
        })?;
        write_record(&self.output_directory.join(INDEX_FILE), &report.index)?;
        log::info!(
            "wrote {} page records to `{}`",
            report.pages.len(),
            self.output_directory.display()
        );
        Ok(())
    }

    /// The output location of `page`'s record.
    pub fn page_path(&self, page: &Page) -> PathBuf {
        self.output_directory.join(format!("{}.yaml", page.id))
    }
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file = File::create(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    serde_yaml::to_writer(file, record).map_err(|err| Error::Yaml {
        path: path.to_owned(),
        err,
    })
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// An error creating an output directory or file.
    #[error("writing `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// An error serializing a record.
    #[error("serializing `{}`: {err}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::Index;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page {
            id: String::from("2016/monads"),
            title: String::from("Monads"),
            date: NaiveDate::from_ymd(2016, 5, 5).and_hms(13, 52, 0),
            layout: String::from("post"),
            categories: vec![String::from("fp")],
            tags: Vec::new(),
            extra: BTreeMap::new(),
            body: String::from("<p>hi</p>\n"),
            blocks: Vec::new(),
            links: Vec::new(),
        };
        let mut report = BuildReport::default();
        report.index = Index::build(std::slice::from_ref(&page));
        report.pages.push(page);

        let writer = Writer {
            output_directory: dir.path(),
        };
        writer.write_report(&report).unwrap();

        let record: serde_yaml::Value = serde_yaml::from_reader(
            File::open(dir.path().join("2016").join("monads.yaml")).unwrap(),
        )
        .unwrap();
        assert_eq!(Some("Monads"), record["title"].as_str());
        assert_eq!(Some("post"), record["layout"].as_str());
        assert_eq!(Some("<p>hi</p>\n"), record["body"].as_str());

        let index_file = File::open(dir.path().join(INDEX_FILE)).unwrap();
        let index: serde_yaml::Value =
            serde_yaml::from_reader(index_file).unwrap();
        assert_eq!(
            Some("2016/monads"),
            index["categories"]["fp"]["pages"][0]["id"].as_str()
        );
    }
}
