//! Defines the [`Document`] type and the loader that reads documents from
//! disk and splits them into their front matter and body.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The front matter delimiter. It must occupy a line on its own.
const FENCE: &str = "---";

/// A front matter entry: a key, a colon, and an optional value.
static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*[ \t]*:(?:[ \t]|$)").unwrap()
});

/// A raw content file. Immutable once read.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The path the document was read from.
    pub path: PathBuf,

    /// The full text of the document.
    pub text: String,
}

/// The result of splitting a [`Document`]. Both halves borrow from the
/// document text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Split<'a> {
    /// The text before the closing delimiter line (and after the opening
    /// one, if present), or `None` when the document has no front matter.
    pub front_matter: Option<&'a str>,

    /// Everything after the closing delimiter line (or the whole document).
    pub body: &'a str,

    /// The 1-based line number of the first line of `front_matter`.
    pub front_matter_line: usize,

    /// The 1-based line number of the first line of `body`.
    pub body_line: usize,
}

/// Reads the file at `path` into a [`Document`]. Files which are missing,
/// unreadable, or not valid UTF-8 produce a [`ReadError`].
pub fn load(path: &Path) -> Result<Document, ReadError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Document {
            path: path.to_owned(),
            text,
        }),
        Err(err) => Err(ReadError {
            path: path.to_owned(),
            err,
        }),
    }
}

impl Document {
    /// Constructs a document from in-memory text.
    pub fn new<P, S>(path: P, text: S) -> Document
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Document {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Splits the document into front matter and body.
    ///
    /// Front matter is normally the text between a leading `---` line and
    /// the next `---` line. The opening delimiter may be left out when the
    /// document begins directly with `key: value` entries, in which case the
    /// front matter runs up to the first `---` line. If neither form
    /// matches, the whole text is body.
    pub fn split(&self) -> Split<'_> {
        let input: &str = &self.text;
        let mut lines = input.split_inclusive('\n');
        let split = match lines.next() {
            Some(first) if is_fence(first) => {
                split_delimited(input, first.len(), lines)
            }
            Some(first) if is_entry(first) => split_bare(input),
            _ => None,
        };
        split.unwrap_or(Split {
            front_matter: None,
            body: input,
            front_matter_line: 1,
            body_line: 1,
        })
    }
}

/// Splits `---\n{front matter}---\n{body}`. `lines` follows the opening
/// delimiter, which is `start` bytes long.
fn split_delimited<'a>(
    input: &'a str,
    start: usize,
    lines: impl Iterator<Item = &'a str>,
) -> Option<Split<'a>> {
    let mut offset = start;
    for (i, line) in lines.enumerate() {
        if is_fence(line) {
            return Some(Split {
                front_matter: Some(&input[start..offset]),
                body: &input[offset + line.len()..],
                front_matter_line: 2,
                body_line: i + 3,
            });
        }
        offset += line.len();
    }
    None
}

/// Splits `{front matter}---\n{body}`, where every front matter line is an
/// entry, a comment, or an indented list item.
fn split_bare(input: &str) -> Option<Split<'_>> {
    let mut offset = 0;
    for (i, line) in input.split_inclusive('\n').enumerate() {
        if is_fence(line) {
            return Some(Split {
                front_matter: Some(&input[..offset]),
                body: &input[offset + line.len()..],
                front_matter_line: 1,
                body_line: i + 2,
            });
        }
        if !(is_entry(line) || is_continuation(line)) {
            return None;
        }
        offset += line.len();
    }
    None
}

fn is_fence(line: &str) -> bool {
    line.trim_end() == FENCE
}

/// Whether `line` reads `key: value` or `key:`.
fn is_entry(line: &str) -> bool {
    ENTRY.is_match(line.trim_end())
}

/// Whether `line` is a comment or a list item belonging to the previous
/// entry.
fn is_continuation(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && (trimmed.starts_with('#')
            || trimmed.starts_with("- ")
            || trimmed == "-"
            || line.starts_with(' ')
            || line.starts_with('\t'))
}

/// Returned when a document can't be read: the file is missing, unreadable,
/// or isn't valid UTF-8.
#[derive(Debug, Error)]
#[error("reading `{}`: {err}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub err: std::io::Error,
}

impl ReadError {
    /// The kind of the underlying I/O failure. Invalid UTF-8 surfaces as
    /// [`std::io::ErrorKind::InvalidData`].
    pub fn kind(&self) -> std::io::ErrorKind {
        self.err.kind()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_reconstructs_source() {
        let text = "---\ntitle: Monads\ndate: 2016-05-05\n---\n\
                    # Heading\n\nBody text.\n";
        let doc = Document::new("post.md", text);
        let split = doc.split();
        assert_eq!(
            Some("title: Monads\ndate: 2016-05-05\n"),
            split.front_matter
        );
        assert_eq!("# Heading\n\nBody text.\n", split.body);
        assert_eq!(4, split.body_line);

        let rebuilt = format!(
            "---\n{}---\n{}",
            split.front_matter.unwrap(),
            split.body
        );
        assert_eq!(text, rebuilt);
    }

    #[test]
    fn test_split_crlf() {
        let doc =
            Document::new("post.md", "---\r\ntitle: X\r\n---\r\nbody\r\n");
        let split = doc.split();
        assert_eq!(Some("title: X\r\n"), split.front_matter);
        assert_eq!("body\r\n", split.body);
    }

    #[test]
    fn test_split_without_opening_delimiter() {
        let text = "title: X\ndate: 2016-05-05 13:52\n---\n\
                    See [here][a].\n\n[a]: http://x.com \"X\"";
        let doc = Document::new("post.md", text);
        assert_eq!(
            Split {
                front_matter: Some("title: X\ndate: 2016-05-05 13:52\n"),
                body: "See [here][a].\n\n[a]: http://x.com \"X\"",
                front_matter_line: 1,
                body_line: 4,
            },
            doc.split()
        );
    }

    #[test]
    fn test_split_without_opening_delimiter_block_list() {
        let doc = Document::new(
            "post.md",
            "title: X\n# draft\ntags:\n  - swift\n- haskell\n---\nbody\n",
        );
        let split = doc.split();
        assert_eq!(
            Some("title: X\n# draft\ntags:\n  - swift\n- haskell\n"),
            split.front_matter
        );
        assert_eq!(7, split.body_line);
    }

    #[test]
    fn test_prose_before_rule_is_body() {
        for text in &[
            "Note: a blank line ends it\n\n---\nbody\n",
            "Note: prose follows\nthe first line\n---\nbody\n",
            "https://example.org\n---\n",
        ] {
            let doc = Document::new("post.md", *text);
            let split = doc.split();
            assert_eq!(None, split.front_matter, "{:?}", text);
            assert_eq!(*text, split.body);
        }
    }

    #[test]
    fn test_split_without_front_matter() {
        let text = "Just a body.\n\n---\n\nWith a rule.\n";
        let doc = Document::new("post.md", text);
        let split = doc.split();
        assert_eq!(None, split.front_matter);
        assert_eq!(text, split.body);
        assert_eq!(1, split.body_line);
    }

    #[test]
    fn test_split_unclosed_front_matter_is_body() {
        for text in &["---\ntitle: X\nno closing fence\n", "title: X\n"] {
            let doc = Document::new("post.md", *text);
            let split = doc.split();
            assert_eq!(None, split.front_matter);
            assert_eq!(*text, split.body);
        }
    }

    #[test]
    fn test_split_empty_front_matter() {
        let doc = Document::new("post.md", "---\n---\nbody");
        let split = doc.split();
        assert_eq!(Some(""), split.front_matter);
        assert_eq!("body", split.body);
        assert_eq!(3, split.body_line);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("./does/not/exist.md")).unwrap_err();
        assert_eq!(std::io::ErrorKind::NotFound, err.kind());
        assert!(err.to_string().contains("does/not/exist.md"));
    }

    #[test]
    fn test_load_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(&path, [0x2d, 0x2d, 0x2d, 0x0a, 0xff, 0xfe]).unwrap();
        let err = load(&path).unwrap_err();
        assert_eq!(std::io::ErrorKind::InvalidData, err.kind());
    }
}
