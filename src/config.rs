//! Loads the project configuration from a `folio.yaml` file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The name of the project file searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "folio.yaml";

/// The date formats accepted when none are configured, most specific first.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
];

/// Pipeline configuration. Every field has a default, so an empty project
/// file is valid.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The directory searched for source documents. Relative paths are
    /// resolved against the directory holding the project file.
    pub source_directory: PathBuf,

    /// The directory page records are written to. Resolved like
    /// `source_directory`.
    pub output_directory: PathBuf,

    /// `chrono` format strings accepted for the `date` front matter key.
    pub date_formats: Vec<String>,

    /// The layout applied to documents whose front matter names none. With
    /// no default, such documents fail assembly.
    pub default_layout: Option<String>,

    /// The number of worker threads. Defaults to the number of CPUs.
    pub threads: Option<usize>,

    /// Stop taking new documents after the first failure.
    pub fail_fast: bool,

    /// Added to every heading level in rendered bodies (capped at `h6`), so
    /// that `#` can sit below a theme's own page title.
    pub heading_offset: u32,

    /// The URL pages are published under. When set, relative links to other
    /// `.md` sources are rewritten to their `.html` pages.
    pub site_root: Option<Url>,

    /// File extensions (without the dot) treated as source documents.
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_directory: PathBuf::from("posts"),
            output_directory: PathBuf::from("_site"),
            date_formats: DEFAULT_DATE_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            default_layout: Some(String::from("post")),
            threads: None,
            fail_fast: false,
            heading_offset: 0,
            site_root: None,
            extensions: vec![String::from("md"), String::from("markdown")],
        }
    }
}

impl Config {
    /// Searches `dir` and each of its ancestors for a `folio.yaml` project
    /// file and loads the first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let mut current = Some(dir);
        while let Some(dir) = current {
            let path = dir.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path);
            }
            current = dir.parent();
        }
        Err(Error::NotFound(dir.to_owned()))
    }

    /// Loads a project file. Relative source and output directories are
    /// anchored to the project file's directory.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            err,
        })?;
        let config = Config::from_yaml(&contents).map_err(|err| Error::Yaml {
            path: path.to_owned(),
            err,
        })?;
        let project_root = path.parent().unwrap_or_else(|| Path::new("."));
        log::debug!("loaded configuration from `{}`", path.display());
        Ok(config.anchored(project_root))
    }

    /// Decodes a configuration from YAML text without resolving any paths.
    pub fn from_yaml(
        contents: &str,
    ) -> std::result::Result<Config, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Resolves relative directories against `root`.
    pub fn anchored(mut self, root: &Path) -> Config {
        self.source_directory = root.join(&self.source_directory);
        self.output_directory = root.join(&self.output_directory);
        self
    }

    /// The effective worker count; never zero.
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading the project configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when no project file exists in the directory or any parent.
    #[error(
        "could not find `{}` in `{}` or any parent directory",
        PROJECT_FILE,
        .0.display()
    )]
    NotFound(PathBuf),

    /// Returned when the project file can't be read.
    #[error("reading project file `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when the project file isn't valid configuration YAML.
    #[error("parsing project file `{}`: {err}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
}
