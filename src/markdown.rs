//! Converts a document body into rendered blocks.
//!
//! Rendering happens in two passes. [`scan`] walks the body line by line and
//! classifies it into [`Block`]s: code is captured verbatim, link reference
//! definitions are pulled out, and the remaining lines are grouped into
//! paragraphs, headings, block quotes and lists. [`render`] then collects
//! every definition before substituting any `[text][label]` span, so a
//! definition may appear before or after its first use.

use crate::htmlrenderer::{push_code_block, HtmlWriter};
use crate::links::{normalize_label, Converter, LinkReference, LinkReferences};
use once_cell::sync::Lazy;
use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag};
use regex::Regex;
use serde::Serialize;
use std::io;
use std::ops::Range;
use thiserror::Error;
use url::Url;

/// `[label]: url "optional title"`, with the title optionally in single
/// quotes or parentheses and the url optionally in angle brackets.
static DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^ {0,3}\[([^\[\]]+)\]:[ \t]*(<[^<>]*>|\S+)"#,
        r#"(?:[ \t]+(?:"([^"]*)"|'([^']*)'|\(([^()]*)\)))?[ \t]*$"#,
    ))
    .unwrap()
});

/// A bullet (`-`, `+`, `*`) or ordered (`1.`, `1)`) list marker.
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}(?:[-+*]|[0-9]{1,9}[.)])(?:[ \t]|$)").unwrap()
});

/// A classified segment of a document body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Block {
    /// The line in the source file where the block begins.
    pub line: usize,

    #[serde(flatten)]
    pub kind: BlockKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    /// Consecutive lines of prose, exactly as written.
    Paragraph { text: String },

    /// A single `#`-prefixed line. `text` excludes the markers.
    Heading { level: u32, text: String },

    /// Consecutive `>`-prefixed lines (and their lazy continuations),
    /// markers included.
    BlockQuote { text: String },

    /// One or more list items exactly as written, including the blank lines
    /// and nested code between them.
    List { text: String },

    /// A fenced code block. `content` is every byte between the opening and
    /// closing fence lines.
    FencedCode {
        language: Option<String>,
        info: String,
        content: String,
    },

    /// An indented code block. `content` is its lines with four columns of
    /// indentation removed.
    IndentedCode { content: String },

    /// A link reference definition. These are never rendered.
    LinkReferenceDefinition {
        label: String,
        url: String,
        title: Option<String>,
    },
}

/// A block together with its HTML.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedBlock {
    pub block: Block,
    pub html: String,
}

/// A link reference that was used in the body, after resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedLink {
    /// The normalized label.
    pub label: String,
    pub url: String,
    pub title: Option<String>,
}

/// The output of [`render`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedBody {
    /// The rendered blocks in source order, link reference definitions
    /// excluded.
    pub blocks: Vec<RenderedBlock>,

    /// The references used by the body, in order of first use.
    pub links: Vec<ResolvedLink>,

    /// The concatenated HTML of `blocks`.
    pub html: String,
}

/// Settings for [`render`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions<'a> {
    /// Added to every heading level.
    pub heading_offset: u32,

    /// When set, links to other `.md` sources are rewritten to pages under
    /// this URL. See [`Converter`].
    pub site_root: Option<&'a Url>,

    /// The id of the page being rendered. Relative links are resolved
    /// against it.
    pub page_id: &'a str,
}

/// Renders `body`. `first_line` is the line number of the first line of
/// `body` within its source file.
pub fn render(
    body: &str,
    first_line: usize,
    options: &RenderOptions,
) -> Result<RenderedBody, RenderError> {
    let blocks = scan(body, first_line);
    let references = collect_references(&blocks);
    let converter = match options.site_root {
        Some(site_root) => Some(
            Converter::new(site_root, options.page_id)
                .map_err(RenderError::SiteRoot)?,
        ),
        None => None,
    };
    let mut substituter = Substituter {
        references: &references,
        converter: converter.as_ref(),
        used: Vec::new(),
    };
    let to_html = |markdown: &str, line| {
        markdown_to_html(
            markdown,
            line,
            options.heading_offset,
            converter.as_ref(),
        )
    };

    let mut rendered = Vec::with_capacity(blocks.len());
    let mut html = String::new();
    for block in blocks {
        let block_html = match &block.kind {
            BlockKind::LinkReferenceDefinition { .. } => continue,
            BlockKind::FencedCode {
                language, content, ..
            } => code_block(language.as_deref(), content)?,
            BlockKind::IndentedCode { content } => code_block(None, content)?,
            BlockKind::Paragraph { text }
            | BlockKind::BlockQuote { text }
            | BlockKind::List { text } => {
                let markdown = substituter.substitute(text, block.line)?;
                to_html(&markdown, block.line)?
            }
            BlockKind::Heading { level, text } => {
                let markdown = format!(
                    "{} {}",
                    "#".repeat(*level as usize),
                    substituter.substitute(text, block.line)?
                );
                to_html(&markdown, block.line)?
            }
        };
        html.push_str(&block_html);
        rendered.push(RenderedBlock {
            block,
            html: block_html,
        });
    }

    Ok(RenderedBody {
        blocks: rendered,
        links: substituter.used,
        html,
    })
}

/// Classifies `body` into blocks without resolving anything.
pub fn scan(body: &str, first_line: usize) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut fence: Option<OpenFence> = None;

    for (i, line) in body.split_inclusive('\n').enumerate() {
        let number = first_line + i;

        if let Some(mut open) = fence.take() {
            if open.is_closed_by(line) {
                blocks.push(open.finish());
            } else {
                open.content.push_str(line);
                fence = Some(open);
            }
            continue;
        }

        if let Some(p) = pending.as_mut() {
            if p.take(line) {
                continue;
            }
        }

        if let Some(open) = OpenFence::parse(line, number) {
            flush(&mut pending, &mut blocks);
            fence = Some(open);
            continue;
        }

        let content = strip_line_ending(line);
        if content.trim().is_empty() {
            flush(&mut pending, &mut blocks);
            continue;
        }

        if let Some(kind) = parse_definition(content) {
            flush(&mut pending, &mut blocks);
            blocks.push(Block { line: number, kind });
            continue;
        }

        if let Some((level, text)) = parse_heading(content) {
            flush(&mut pending, &mut blocks);
            blocks.push(Block {
                line: number,
                kind: BlockKind::Heading {
                    level,
                    text: text.to_owned(),
                },
            });
            continue;
        }

        if LIST_ITEM.is_match(content) {
            flush(&mut pending, &mut blocks);
            pending = Some(Pending::new(Gathering::List, number, line));
            continue;
        }

        // Indented lines continue a paragraph but otherwise begin code.
        if pending.is_none() && indentation(content) >= 4 {
            pending = Some(Pending::new(Gathering::IndentedCode, number, line));
            continue;
        }

        let gathering = match is_quote(content) {
            true => Gathering::Quote,
            false => Gathering::Paragraph,
        };
        // A prose line following a quote is a lazy continuation of it.
        let continues = match &pending {
            Some(p) => match p.gathering {
                Gathering::Quote => true,
                Gathering::Paragraph => gathering == Gathering::Paragraph,
                Gathering::List | Gathering::IndentedCode => false,
            },
            None => false,
        };
        if let (true, Some(p)) = (continues, pending.as_mut()) {
            p.text.push_str(line);
            continue;
        }
        flush(&mut pending, &mut blocks);
        pending = Some(Pending::new(gathering, number, line));
    }

    // An unclosed fence runs to the end of the body.
    if let Some(open) = fence {
        blocks.push(open.finish());
    }
    flush(&mut pending, &mut blocks);
    blocks
}

/// Builds the reference table for a scanned body. Later definitions replace
/// earlier ones.
pub fn collect_references(blocks: &[Block]) -> LinkReferences {
    let mut references = LinkReferences::new();
    for block in blocks {
        if let BlockKind::LinkReferenceDefinition { label, url, title } =
            &block.kind
        {
            references.define(label, url, title.as_deref());
        }
    }
    references
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

fn code_block(language: Option<&str>, content: &str) -> io::Result<String> {
    let mut out = String::new();
    push_code_block(&mut out, language, content)?;
    Ok(out)
}

/// Renders a block of Markdown. `line` is where the block begins and is
/// reported for links the converter rejects.
fn markdown_to_html(
    markdown: &str,
    line: usize,
    heading_offset: u32,
    converter: Option<&Converter>,
) -> Result<String, RenderError> {
    let mut events = Vec::new();
    for event in Parser::new_ext(markdown, parser_options()) {
        events.push(match converter {
            Some(converter) => convert_event(converter, event, line)?,
            None => event,
        });
    }

    let mut out = String::new();
    HtmlWriter::new(heading_offset).write(&mut out, events.into_iter())?;
    Ok(out)
}

/// Points links at other sources to their pages. Email autolinks are left
/// alone.
fn convert_event<'a>(
    converter: &Converter,
    event: Event<'a>,
    line: usize,
) -> Result<Event<'a>, RenderError> {
    Ok(match event {
        Event::Start(Tag::Link(link_type, url, title))
            if !matches!(link_type, LinkType::Email) =>
        {
            let converted =
                converter.convert(&url).map_err(|err| RenderError::Link {
                    line,
                    url: url.to_string(),
                    err,
                })?;
            Event::Start(Tag::Link(
                link_type,
                CowStr::Boxed(converted.into_boxed_str()),
                title,
            ))
        }
        _ => event,
    })
}

/// The byte ranges of the code blocks nested in a block of Markdown, such as
/// a fence inside a list item or a block quote.
fn code_blocks(markdown: &str) -> Vec<Range<usize>> {
    Parser::new_ext(markdown, parser_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) => Some(range),
            _ => None,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Gathering {
    Paragraph,
    Quote,
    List,
    IndentedCode,
}

/// A block still gathering lines.
struct Pending {
    gathering: Gathering,
    line: usize,
    text: String,

    /// Blank lines since the last line of a list or indented code block.
    /// They belong to the block only if it continues after them.
    blanks: String,
}

impl Pending {
    fn new(gathering: Gathering, line: usize, text: &str) -> Pending {
        Pending {
            gathering,
            line,
            text: text.to_owned(),
            blanks: String::new(),
        }
    }

    /// Offers `line` to a list or indented code block, either of which may
    /// span blank lines. Returns false if the line isn't part of the block.
    fn take(&mut self, line: &str) -> bool {
        let content = strip_line_ending(line);
        let spans_blanks = match self.gathering {
            Gathering::List | Gathering::IndentedCode => true,
            Gathering::Paragraph | Gathering::Quote => false,
        };
        if !spans_blanks {
            return false;
        }
        if content.trim().is_empty() {
            self.blanks.push_str(line);
            return true;
        }

        let takes = match self.gathering {
            Gathering::List => {
                indentation(content) >= 2
                    || LIST_ITEM.is_match(content)
                    || (self.blanks.is_empty() && !interrupts(line))
            }
            _ => indentation(content) >= 4,
        };
        if takes {
            self.text.push_str(&self.blanks);
            self.blanks.clear();
            self.text.push_str(line);
        }
        takes
    }
}

fn flush(pending: &mut Option<Pending>, blocks: &mut Vec<Block>) {
    if let Some(Pending {
        gathering,
        line,
        text,
        ..
    }) = pending.take()
    {
        let kind = match gathering {
            Gathering::IndentedCode => BlockKind::IndentedCode {
                content: text
                    .split_inclusive('\n')
                    .map(strip_code_indentation)
                    .collect(),
            },
            _ => {
                let text = strip_line_ending(&text).to_owned();
                match gathering {
                    Gathering::Quote => BlockKind::BlockQuote { text },
                    Gathering::List => BlockKind::List { text },
                    _ => BlockKind::Paragraph { text },
                }
            }
        };
        blocks.push(Block { line, kind });
    }
}

/// Whether `line` begins a block of its own rather than continuing a
/// paragraph.
fn interrupts(line: &str) -> bool {
    let content = strip_line_ending(line);
    OpenFence::parse(line, 0).is_some()
        || parse_definition(content).is_some()
        || parse_heading(content).is_some()
        || is_quote(content)
}

struct OpenFence {
    marker: char,
    len: usize,
    info: String,
    line: usize,
    content: String,
}

impl OpenFence {
    /// Recognizes an opening fence: up to three spaces of indentation, then
    /// three or more backticks or tildes, then an optional info string.
    fn parse(line: &str, number: usize) -> Option<OpenFence> {
        let rest = unindent(strip_line_ending(line))?;
        let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = rest.len() - rest.trim_start_matches(marker).len();
        if len < 3 {
            return None;
        }
        let info = rest[len..].trim();
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some(OpenFence {
            marker,
            len,
            info: info.to_owned(),
            line: number,
            content: String::new(),
        })
    }

    /// A closing fence uses the same character, is at least as long as the
    /// opening fence, and has nothing but whitespace after it.
    fn is_closed_by(&self, line: &str) -> bool {
        match unindent(strip_line_ending(line)) {
            Some(rest) => {
                let after = rest.trim_start_matches(self.marker);
                rest.len() - after.len() >= self.len && after.trim().is_empty()
            }
            None => false,
        }
    }

    fn finish(self) -> Block {
        Block {
            line: self.line,
            kind: BlockKind::FencedCode {
                language: self
                    .info
                    .split_whitespace()
                    .next()
                    .map(str::to_owned),
                info: self.info,
                content: self.content,
            },
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(|c: char| c == '\n' || c == '\r')
}

/// Strips up to three leading spaces. Returns `None` for lines indented
/// further.
fn unindent(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(' ');
    match line.len() - rest.len() {
        0..=3 => Some(rest),
        _ => None,
    }
}

/// The width of `line`'s leading whitespace in columns. Tabs advance to the
/// next multiple of four.
fn indentation(line: &str) -> usize {
    let mut columns = 0;
    for c in line.chars() {
        match c {
            ' ' => columns += 1,
            '\t' => columns += 4 - columns % 4,
            _ => break,
        }
    }
    columns
}

/// Removes up to four columns of leading whitespace.
fn strip_code_indentation(line: &str) -> &str {
    let mut columns = 0;
    for (i, c) in line.char_indices() {
        if columns >= 4 {
            return &line[i..];
        }
        match c {
            ' ' => columns += 1,
            '\t' => columns += 4 - columns % 4,
            _ => return &line[i..],
        }
    }
    ""
}

fn parse_definition(content: &str) -> Option<BlockKind> {
    let captures = DEFINITION.captures(content)?;
    let label = captures.get(1)?.as_str();
    if label.trim().is_empty() {
        return None;
    }
    let url = captures.get(2)?.as_str();
    let url = url
        .strip_prefix('<')
        .and_then(|u| u.strip_suffix('>'))
        .unwrap_or(url);
    let title = captures
        .get(3)
        .or_else(|| captures.get(4))
        .or_else(|| captures.get(5))
        .map(|t| t.as_str().to_owned());
    Some(BlockKind::LinkReferenceDefinition {
        label: label.trim().to_owned(),
        url: url.to_owned(),
        title,
    })
}

fn parse_heading(content: &str) -> Option<(u32, &str)> {
    let rest = unindent(content)?;
    let level = rest.len() - rest.trim_start_matches('#').len();
    if level == 0 || level > 6 {
        return None;
    }
    let text = &rest[level..];
    if !(text.is_empty() || text.starts_with(' ') || text.starts_with('\t')) {
        return None;
    }
    let text = text.trim();
    // Drop an optional closing sequence of `#`s.
    let without_closing = text.trim_end_matches('#');
    let closed =
        without_closing.is_empty() || without_closing.ends_with(' ');
    let text = match closed {
        true => without_closing.trim_end(),
        false => text,
    };
    Some((level as u32, text))
}

fn is_quote(content: &str) -> bool {
    unindent(content).map_or(false, |rest| rest.starts_with('>'))
}

/// Replaces reference spans with inline links, remembering which references
/// were used.
struct Substituter<'a> {
    references: &'a LinkReferences,
    converter: Option<&'a Converter<'a>>,
    used: Vec<ResolvedLink>,
}

impl Substituter<'_> {
    /// Substitutes every reference span in `text` outside of code. `line` is
    /// the line on which `text` begins.
    fn substitute(
        &mut self,
        text: &str,
        line: usize,
    ) -> Result<String, RenderError> {
        let mut out = String::with_capacity(text.len());
        let mut position = 0;
        for code in code_blocks(text) {
            self.substitute_prose(&mut out, text, position..code.start, line)?;
            out.push_str(&text[code.clone()]);
            position = code.end;
        }
        self.substitute_prose(&mut out, text, position..text.len(), line)?;
        Ok(out)
    }

    /// Substitutes the reference spans in `text[range]`. Code spans and
    /// backslash-escaped characters are copied as they are.
    fn substitute_prose(
        &mut self,
        out: &mut String,
        text: &str,
        range: Range<usize>,
        line: usize,
    ) -> Result<(), RenderError> {
        let prose = &text[range.clone()];
        let bytes = prose.as_bytes();
        let mut copied = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'`' => i = skip_code_span(prose, i),
                b'[' => match ReferenceSpan::parse(prose, i) {
                    Some(span) => {
                        let at = line
                            + text[..range.start + i].matches('\n').count();
                        let reference = self.resolve(span.label(prose), at)?;
                        out.push_str(&prose[copied..i]);
                        push_inline_link(out, &prose[span.text], &reference);
                        i = span.end;
                        copied = span.end;
                    }
                    None => i += 1,
                },
                _ => i += 1,
            }
        }
        out.push_str(&prose[copied..]);
        Ok(())
    }

    fn resolve(
        &mut self,
        label: &str,
        line: usize,
    ) -> Result<LinkReference, RenderError> {
        let reference = self.references.resolve(label).ok_or_else(|| {
            UnresolvedReferenceError {
                label: label.to_owned(),
                line,
            }
        })?;
        let url = match self.converter {
            Some(converter) => converter.convert(&reference.url).map_err(
                |err| RenderError::Link {
                    line,
                    url: reference.url.clone(),
                    err,
                },
            )?,
            None => reference.url.clone(),
        };
        let resolved = LinkReference {
            url,
            title: reference.title.clone(),
        };

        let normalized = normalize_label(label);
        if !self.used.iter().any(|link| link.label == normalized) {
            self.used.push(ResolvedLink {
                label: normalized,
                url: resolved.url.clone(),
                title: resolved.title.clone(),
            });
        }
        Ok(resolved)
    }
}

/// A `[text][label]` or collapsed `[text][]` span, as byte ranges into the
/// prose it was found in.
struct ReferenceSpan {
    text: Range<usize>,
    label: Range<usize>,
    end: usize,
}

impl ReferenceSpan {
    /// Parses the span whose link text opens at `open`. Code spans in the
    /// link text are opaque, so `` [`xs[0]`][index] `` is a single span.
    fn parse(prose: &str, open: usize) -> Option<ReferenceSpan> {
        let bytes = prose.as_bytes();
        let mut i = open + 1;
        let text_end = loop {
            match *bytes.get(i)? {
                b'\\' => i += 2,
                b'`' => i = skip_code_span(prose, i),
                b'[' => return None,
                b']' => break i,
                _ => i += 1,
            }
        };
        if bytes.get(text_end + 1) != Some(&b'[') {
            return None;
        }

        let label_start = text_end + 2;
        let label_len =
            prose[label_start..].find(|c: char| c == '[' || c == ']')?;
        let label_end = label_start + label_len;
        if bytes[label_end] != b']' {
            return None;
        }
        Some(ReferenceSpan {
            text: open + 1..text_end,
            label: label_start..label_end,
            end: label_end + 1,
        })
    }

    /// The label, trimmed. A collapsed span is labelled by its text.
    fn label<'p>(&self, prose: &'p str) -> &'p str {
        match prose[self.label.clone()].trim() {
            "" => prose[self.text.clone()].trim(),
            label => label,
        }
    }
}

fn push_inline_link(out: &mut String, text: &str, reference: &LinkReference) {
    out.push('[');
    out.push_str(text);
    out.push_str("](");
    out.push_str(&inline_destination(&reference.url));
    if let Some(title) = &reference.title {
        out.push_str(" \"");
        out.push_str(&title.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
    }
    out.push(')');
}

/// Returns the end of the code span whose opening backtick run starts at
/// `start`. A run with no closing run of the same length is literal.
fn skip_code_span(text: &str, start: usize) -> usize {
    let run = text[start..].len() - text[start..].trim_start_matches('`').len();
    let code_start = start + run;
    match find_closing_run(&text[code_start..], run) {
        Some(close) => code_start + close + run,
        None => code_start,
    }
}

/// Finds the offset of the next run of exactly `len` backticks.
fn find_closing_run(text: &str, len: usize) -> Option<usize> {
    let mut position = 0;
    while let Some(found) = text[position..].find('`') {
        let start = position + found;
        let run =
            text[start..].len() - text[start..].trim_start_matches('`').len();
        if run == len {
            return Some(start);
        }
        position = start + run;
    }
    None
}

/// Formats a url as an inline link destination.
fn inline_destination(url: &str) -> String {
    let url = url
        .replace(' ', "%20")
        .replace('<', "%3C")
        .replace('>', "%3E");
    match url.contains('(') || url.contains(')') {
        true => format!("<{}>", url),
        false => url,
    }
}

/// Returned when a reference span names a label that is never defined.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("line {line}: unresolved link reference `{label}`")]
pub struct UnresolvedReferenceError {
    /// The label as written, trimmed.
    pub label: String,
    pub line: usize,
}

/// Represents an error rendering a body.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Returned for reference spans without a definition.
    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReferenceError),

    /// Returned when the configured site root can't anchor the page's links.
    #[error("resolving page url against the site root: {0}")]
    SiteRoot(#[source] url::ParseError),

    /// Returned when a link destination isn't a valid URL.
    #[error("line {line}: converting link `{url}`: {err}")]
    Link {
        line: usize,
        url: String,
        #[source]
        err: url::ParseError,
    },

    /// Returned for failures writing HTML.
    #[error("writing html: {0}")]
    Io(#[from] io::Error),
}
