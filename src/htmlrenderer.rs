//! Writes [`pulldown_cmark`] events as HTML. This is largely modeled after
//! [`pulldown_cmark`]'s private `HtmlWriter`, with two differences: heading
//! levels are shifted by a configurable offset, and fenced code blocks are
//! written through [`push_code_block`] so that the pipeline's own fenced code
//! blocks and those nested in block quotes render identically.

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::io;

/// The deepest heading level HTML supports.
const MAX_HEADING_LEVEL: u32 = 6;

/// Renders markdown [`Event`]s into HTML.
pub struct HtmlWriter {
    /// Added to every heading level.
    heading_offset: u32,

    table_alignments: Vec<Alignment>,
    table_cell_index: usize,
    in_table_head: bool,

    /// Nonzero while the alt text of an image is being written. Alt text is
    /// an attribute value, so nested markup is flattened to escaped text.
    image_depth: usize,

    /// Titles of the images currently open; written when each one closes.
    image_titles: Vec<String>,
}

impl HtmlWriter {
    pub fn new(heading_offset: u32) -> HtmlWriter {
        HtmlWriter {
            heading_offset,
            table_alignments: Vec::new(),
            table_cell_index: 0,
            in_table_head: false,
            image_depth: 0,
            image_titles: Vec::new(),
        }
    }

    /// Writes every event of `events` to `w`.
    pub fn write<'a, W, I>(&mut self, w: &mut W, events: I) -> io::Result<()>
    where
        W: StrWrite,
        I: Iterator<Item = Event<'a>>,
    {
        for event in events {
            self.on_event(w, event)?;
        }
        Ok(())
    }

    fn on_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event,
    ) -> io::Result<()> {
        if self.image_depth > 0 {
            return self.on_alt_text(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Text(text) => escape_html(&mut *w, &text),
            Event::Code(code) => {
                w.write_str("<code>")?;
                escape_html(&mut *w, &code)?;
                w.write_str("</code>")
            }
            Event::Html(html) => w.write_str(&html),
            Event::SoftBreak => w.write_str("\n"),
            Event::HardBreak => w.write_str("<br />\n"),
            Event::Rule => w.write_str("<hr />\n"),
            Event::TaskListMarker(checked) => w.write_str(match checked {
                true => r#"<input disabled="" type="checkbox" checked="" />"#,
                false => r#"<input disabled="" type="checkbox" />"#,
            }),
            // Footnotes aren't enabled, so the parser never produces these.
            Event::FootnoteReference(name) => escape_html(&mut *w, &name),
        }
    }

    fn on_alt_text<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event,
    ) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(_, _, title)) => {
                self.image_depth += 1;
                self.image_titles.push(title.to_string());
                Ok(())
            }
            Event::End(Tag::Image(_, _, _)) => {
                self.image_depth -= 1;
                let title = self.image_titles.pop().unwrap_or_default();
                if self.image_depth > 0 {
                    return Ok(());
                }
                if !title.is_empty() {
                    w.write_str(r#"" title=""#)?;
                    escape_html(&mut *w, &title)?;
                }
                w.write_str(r#"" />"#)
            }
            Event::Text(text) | Event::Code(text) => {
                escape_html(&mut *w, &text)
            }
            Event::SoftBreak | Event::HardBreak => w.write_str(" "),
            _ => Ok(()),
        }
    }

    fn on_start<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Heading(level) => {
                write!(w, "<h{}>", self.heading_level(level))
            }
            Tag::BlockQuote => w.write_str("<blockquote>\n"),
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                open_code_block(w, info.split_whitespace().next())
            }
            Tag::CodeBlock(CodeBlockKind::Indented) => open_code_block(w, None),
            Tag::List(None) => w.write_str("<ul>\n"),
            Tag::List(Some(1)) => w.write_str("<ol>\n"),
            Tag::List(Some(start)) => write!(w, r#"<ol start="{}">"#, start),
            Tag::Item => w.write_str("<li>"),
            Tag::FootnoteDefinition(_) => Ok(()),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => {
                let cell = match self.in_table_head {
                    true => "th",
                    false => "td",
                };
                let alignment =
                    self.table_alignments.get(self.table_cell_index);
                let align = match alignment {
                    Some(Alignment::Left) => "left",
                    Some(Alignment::Right) => "right",
                    Some(Alignment::Center) => "center",
                    _ => return write!(w, "<{}>", cell),
                };
                write!(w, r#"<{} align="{}">"#, cell, align)
            }
            Tag::Emphasis => w.write_str("<em>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Link(link_type, dest, title) => {
                w.write_str(r#"<a href=""#)?;
                if let LinkType::Email = link_type {
                    w.write_str("mailto:")?;
                }
                escape_href(&mut *w, &dest)?;
                write_title(w, &title)?;
                w.write_str(">")
            }
            Tag::Image(_, dest, title) => {
                w.write_str(r#"<img src=""#)?;
                escape_href(&mut *w, &dest)?;
                w.write_str(r#"" alt=""#)?;
                self.image_depth += 1;
                self.image_titles.push(title.to_string());
                Ok(())
            }
        }
    }

    fn on_end<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::Paragraph => w.write_str("</p>\n"),
            Tag::Heading(level) => {
                writeln!(w, "</h{}>", self.heading_level(level))
            }
            Tag::BlockQuote => w.write_str("</blockquote>\n"),
            Tag::CodeBlock(_) => w.write_str("</code></pre>\n"),
            Tag::List(None) => w.write_str("</ul>\n"),
            Tag::List(Some(_)) => w.write_str("</ol>\n"),
            Tag::Item => w.write_str("</li>\n"),
            Tag::FootnoteDefinition(_) => Ok(()),
            Tag::Table(_) => w.write_str("</tbody></table>\n"),
            Tag::TableHead => {
                self.in_table_head = false;
                w.write_str("</tr></thead><tbody>\n")
            }
            Tag::TableRow => w.write_str("</tr>\n"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.in_table_head {
                    true => "</th>",
                    false => "</td>",
                })
            }
            Tag::Emphasis => w.write_str("</em>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            // Closed in `on_alt_text`.
            Tag::Image(_, _, _) => Ok(()),
        }
    }

    fn heading_level(&self, level: u32) -> u32 {
        heading_level(level, self.heading_offset)
    }
}

/// Shifts `level` by `offset`, capped at `h6`.
pub fn heading_level(level: u32, offset: u32) -> u32 {
    level.saturating_add(offset).min(MAX_HEADING_LEVEL)
}

/// Writes a complete code block. `content` is escaped but otherwise written
/// exactly as given.
pub fn push_code_block<W: StrWrite>(
    w: &mut W,
    language: Option<&str>,
    content: &str,
) -> io::Result<()> {
    open_code_block(w, language)?;
    escape_html(&mut *w, content)?;
    w.write_str("</code></pre>\n")
}

fn open_code_block<W: StrWrite>(
    w: &mut W,
    language: Option<&str>,
) -> io::Result<()> {
    match language {
        Some(lang) if !lang.is_empty() => {
            w.write_str(r#"<pre><code class="language-"#)?;
            escape_html(&mut *w, lang)?;
            w.write_str(r#"">"#)
        }
        _ => w.write_str("<pre><code>"),
    }
}

fn write_title<W: StrWrite>(w: &mut W, title: &CowStr) -> io::Result<()> {
    if title.is_empty() {
        return w.write_str(r#"""#);
    }
    w.write_str(r#"" title=""#)?;
    escape_html(&mut *w, title)?;
    w.write_str(r#"""#)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use pulldown_cmark::{Options, Parser};

    fn render(markdown: &str, heading_offset: u32) -> String {
        let mut out = String::new();
        HtmlWriter::new(heading_offset)
            .write(&mut out, Parser::new_ext(markdown, Options::ENABLE_TABLES))
            .unwrap();
        out
    }

    #[test]
    fn test_heading_offset() {
        assert_eq!("<h3>Bind</h3>\n", render("# Bind", 2));
        assert_eq!("<h6>Deep</h6>\n", render("##### Deep", 2));
    }

    #[test]
    fn test_link_with_title() {
        assert_eq!(
            "<p>See <a href=\"http://x.com\" title=\"X &amp; Y\">\
             here</a>.</p>\n",
            render("See [here](http://x.com \"X & Y\").", 0)
        );
    }

    #[test]
    fn test_image_alt_text() {
        assert_eq!(
            "<p><img src=\"monad.png\" alt=\"a monad\" \
             title=\"Burrito\" /></p>\n",
            render("![a *monad*](monad.png \"Burrito\")", 0)
        );
    }

    #[test]
    fn test_inline_code_escaped() {
        assert_eq!(
            "<p><code>m &gt;&gt;= f</code></p>\n",
            render("`m >>= f`", 0)
        );
    }

    #[test]
    fn test_table_alignment() {
        assert_eq!(
            "<table><thead><tr><th align=\"left\">a</th><th>b</th></tr>\
             </thead><tbody>\n\
             <tr><td align=\"left\">1</td><td>2</td></tr>\n\
             </tbody></table>\n",
            render("| a | b |\n|:--|---|\n| 1 | 2 |\n", 0)
        );
    }

    #[test]
    fn test_push_code_block() {
        let mut out = String::new();
        push_code_block(&mut out, Some("haskell"), "x <- getLine\n").unwrap();
        assert_eq!(
            "<pre><code class=\"language-haskell\">\
             x &lt;- getLine\n</code></pre>\n",
            out
        );
    }
}
