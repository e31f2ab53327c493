//! Wikitext document tree.
//!
//! [`Document::parse`] turns raw article markup into a lead plus a tree of
//! heading-delimited sections whose bodies are flat lists of [`Node`]s.
//! [`Document::render`] walks the tree and emits plain text, leaving out any
//! section or link an [`Exclusions`] value names. The tree is never mutated;
//! exclusion is decided while rendering.

use crate::config::MAX_NESTING_DEPTH;
use crate::error::MarkupError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::iter::Peekable;
use std::vec::IntoIter;

static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(={1,6})(.+?)(={1,6})[ \t\r]*$").unwrap());

/// `==Title==` written mid-line, with no space inside the markers.
static INLINE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(={2,6})([^=\s](?:[^=\n]*[^=\s])?)(={2,6})(?:\s|$)").unwrap());

static MAGIC_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^__[A-Z]+__").unwrap());

static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:https?://|ftp://|mailto:|//)").unwrap());

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Tags whose contents never show up in rendered text.
const INVISIBLE_TAGS: &[&str] = &[
    "ref",
    "references",
    "gallery",
    "math",
    "chem",
    "score",
    "timeline",
    "graph",
    "imagemap",
    "inputbox",
    "templatedata",
    "categorytree",
    "includeonly",
];

/// Tags recognised as markup; anything else in angle brackets is literal text.
const KNOWN_TAGS: &[&str] = &[
    "ref", "references", "gallery", "math", "chem", "score", "timeline", "graph", "imagemap",
    "inputbox", "templatedata", "categorytree", "includeonly", "noinclude", "onlyinclude",
    "nowiki", "pre", "code", "syntaxhighlight", "source", "poem", "div", "span", "small", "big",
    "sup", "sub", "s", "u", "i", "b", "em", "strong", "br", "hr", "center", "blockquote", "p",
    "font", "abbr", "cite", "del", "ins", "q", "tt", "var", "kbd", "table", "tr", "td", "th",
    "ul", "ol", "li",
];

const MEDIA_OPTIONS: &[&str] = &[
    "thumb",
    "thumbnail",
    "frame",
    "framed",
    "frameless",
    "border",
    "left",
    "right",
    "center",
    "centre",
    "none",
    "upright",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    /// `[[target]]` or `[[target|label]]`
    Link {
        target: String,
        label: Option<Vec<Node>>,
    },
    /// `[[File:...]]` / `[[Image:...]]`; only the caption is prose
    Media {
        target: String,
        caption: Vec<Node>,
    },
    /// `[url label]`
    ExternalLink {
        url: String,
        label: Vec<Node>,
    },
    Template(String),
    /// Cell contents of a `{| ... |}` table, one row per line
    Table(Vec<Node>),
    Comment(String),
    /// Paired tag whose contents are hidden (`<ref>`, `<math>`, ...)
    Tag {
        name: String,
        body: String,
    },
    Nowiki(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    /// Title exactly as written between the `=` markers
    pub title: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: Heading,
    pub body: Vec<Node>,
    pub subsections: Vec<Section>,
}

impl Section {
    /// True if this section's own heading, or any heading nested under it, is in `names`.
    pub fn contains_heading(&self, names: &[&str]) -> bool {
        names.contains(&self.heading.title.trim())
            || self.subsections.iter().any(|s| s.contains_heading(names))
    }

    fn collect_headings<'a>(&'a self, out: &mut Vec<&'a Heading>) {
        out.push(&self.heading);
        for sub in &self.subsections {
            sub.collect_headings(out);
        }
    }

    fn render_into(&self, exclusions: &Exclusions<'_>, out: &mut String) {
        if self.contains_heading(exclusions.headings) {
            return;
        }
        render_nodes(&self.heading.nodes, exclusions, out);
        render_nodes(&self.body, exclusions, out);
        for sub in &self.subsections {
            sub.render_into(exclusions, out);
        }
    }
}

/// What to leave out when rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exclusions<'a> {
    /// Sections whose trimmed heading title (or any sub-heading's) matches exactly
    pub headings: &'a [&'a str],
    /// Wikilinks whose raw target starts with one of these
    pub link_prefixes: &'a [&'a str],
}

impl Exclusions<'_> {
    fn drops_link(&self, target: &str) -> bool {
        self.link_prefixes.iter().any(|p| target.starts_with(p))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub lead: Vec<Node>,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, MarkupError> {
        let items = Parser::new(text, 0, 0, true)?.run()?;
        Ok(build_tree(items))
    }

    /// Every heading in document order.
    pub fn headings(&self) -> Vec<&Heading> {
        let mut out = Vec::new();
        for section in &self.sections {
            section.collect_headings(&mut out);
        }
        out
    }

    pub fn render(&self, exclusions: &Exclusions<'_>) -> String {
        let mut out = String::new();
        render_nodes(&self.lead, exclusions, &mut out);
        for section in &self.sections {
            section.render_into(exclusions, &mut out);
        }
        if out.contains("\n\n\n") {
            EXCESS_NEWLINES.replace_all(&out, "\n\n").into_owned()
        } else {
            out
        }
    }

    pub fn to_plain_text(&self) -> String {
        self.render(&Exclusions::default())
    }
}

fn render_nodes(nodes: &[Node], exclusions: &Exclusions<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) | Node::Nowiki(text) => out.push_str(text),
            Node::Link { target, label } => {
                if exclusions.drops_link(target) {
                    continue;
                }
                match label {
                    Some(label) => render_nodes(label, exclusions, out),
                    None => out.push_str(&decode_entities(target)),
                }
            }
            Node::Media { caption, .. } => render_nodes(caption, exclusions, out),
            Node::ExternalLink { label, .. } => render_nodes(label, exclusions, out),
            Node::Table(cells) => render_nodes(cells, exclusions, out),
            Node::Template(_) | Node::Comment(_) | Node::Tag { .. } => {}
        }
    }
}

enum Item {
    Node(Node),
    Heading(Heading),
}

fn build_tree(items: Vec<Item>) -> Document {
    let mut items = items.into_iter().peekable();
    let lead = take_body(&mut items);
    let sections = take_sections(&mut items, 0);
    Document { lead, sections }
}

fn take_body(items: &mut Peekable<IntoIter<Item>>) -> Vec<Node> {
    let mut body = Vec::new();
    while let Some(Item::Node(_)) = items.peek() {
        if let Some(Item::Node(node)) = items.next() {
            body.push(node);
        }
    }
    body
}

/// Sections run until the next heading at the same or a shallower level.
fn take_sections(items: &mut Peekable<IntoIter<Item>>, parent_level: u8) -> Vec<Section> {
    let mut sections = Vec::new();
    while let Some(Item::Heading(next)) = items.peek() {
        if next.level <= parent_level {
            break;
        }
        let Some(Item::Heading(heading)) = items.next() else {
            break;
        };
        let body = take_body(items);
        let subsections = take_sections(items, heading.level);
        sections.push(Section {
            heading,
            body,
            subsections,
        });
    }
    sections
}

type Step = Result<Option<usize>, MarkupError>;

struct Parser<'a> {
    text: &'a str,
    /// Offset of `text` inside the whole document, for error positions
    base: usize,
    depth: usize,
    /// Only the outermost parser recognises headings and line-start markup
    top: bool,
    items: Vec<Item>,
    text_start: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, base: usize, depth: usize, top: bool) -> Result<Self, MarkupError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(MarkupError::NestingTooDeep {
                offset: base,
                limit: MAX_NESTING_DEPTH,
            });
        }
        Ok(Self {
            text,
            base,
            depth,
            top,
            items: Vec::new(),
            text_start: 0,
        })
    }

    fn run(mut self) -> Result<Vec<Item>, MarkupError> {
        let text = self.text;
        let bytes = text.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if self.at_line_start(i) {
                if let Some(next) = self.line_start(i)? {
                    i = next;
                    continue;
                }
            }

            let next = match bytes[i] {
                b'<' => self.angle(i)?,
                b'{' => self.brace(i)?,
                b'[' => self.bracket(i)?,
                b'\'' => self.quotes(i)?,
                b'_' => self.magic_word(i)?,
                b'=' if self.top => self.inline_heading(i)?,
                _ => None,
            };
            i = next.unwrap_or(i + 1);
        }

        self.flush(bytes.len());
        Ok(self.items)
    }

    fn at_line_start(&self, i: usize) -> bool {
        if i == 0 {
            self.top
        } else {
            self.text.as_bytes()[i - 1] == b'\n'
        }
    }

    fn flush(&mut self, upto: usize) {
        if self.text_start < upto {
            let literal = &self.text[self.text_start..upto];
            self.items
                .push(Item::Node(Node::Text(decode_entities(literal).into_owned())));
        }
    }

    fn push(&mut self, at: usize, item: Item, resume: usize) -> Option<usize> {
        self.flush(at);
        self.items.push(item);
        self.text_start = resume;
        Some(resume)
    }

    fn skip(&mut self, at: usize, resume: usize) -> Option<usize> {
        self.flush(at);
        self.text_start = resume;
        Some(resume)
    }

    fn nested(&self, start: usize, end: usize) -> Result<Vec<Node>, MarkupError> {
        parse_nodes(&self.text[start..end], self.base + start, self.depth + 1)
    }

    fn heading(&self, start: usize, end: usize, level: usize) -> Result<Heading, MarkupError> {
        let raw = &self.text[start..end];
        let inner_start = start + (raw.len() - raw.trim_start().len());
        let inner_end = inner_start + raw.trim().len();
        Ok(Heading {
            level: level as u8,
            title: raw.to_string(),
            nodes: self.nested(inner_start, inner_end)?,
        })
    }

    /// Headings, tables, list markers and rules only exist at the start of a line.
    fn line_start(&mut self, i: usize) -> Step {
        let text = self.text;
        let bytes = text.as_bytes();
        let line_end = text[i..].find('\n').map_or(text.len(), |p| i + p);

        if self.top {
            let line = &text[i..line_end];
            if let Some(caps) = HEADING_LINE.captures(line) {
                let level = caps[1].len().min(caps[3].len());
                let trimmed = line.trim_end_matches([' ', '\t', '\r']).len();
                if i + level < i + trimmed - level {
                    let heading = self.heading(i + level, i + trimmed - level, level)?;
                    return Ok(self.push(i, Item::Heading(heading), line_end));
                }
            }
        }

        if text[i..].starts_with("{|") {
            if let Some(end) = table_end(text, i) {
                let cells = table_cells(&text[i..end]);
                let table = Node::Table(parse_nodes(&cells, self.base + i, self.depth + 1)?);
                return Ok(self.push(i, Item::Node(table), end));
            }
        }

        let markers = bytes[i..]
            .iter()
            .take_while(|b| matches!(b, b'*' | b'#' | b':' | b';'))
            .count();
        if markers > 0 {
            return Ok(self.skip(i, i + markers));
        }

        let dashes = bytes[i..].iter().take_while(|b| **b == b'-').count();
        if dashes >= 4 {
            return Ok(self.skip(i, i + dashes));
        }

        Ok(None)
    }

    fn inline_heading(&mut self, i: usize) -> Step {
        let text = self.text;
        if i == 0 || !matches!(text.as_bytes()[i - 1], b' ' | b'\t') {
            return Ok(None);
        }
        let Some(caps) = INLINE_HEADING.captures(&text[i..]) else {
            return Ok(None);
        };
        let (Some(open), Some(title), Some(close)) = (caps.get(1), caps.get(2), caps.get(3))
        else {
            return Ok(None);
        };
        if open.len() != close.len() {
            return Ok(None);
        }

        let heading = self.heading(i + title.start(), i + title.end(), open.len())?;
        Ok(self.push(i, Item::Heading(heading), i + close.end()))
    }

    fn brace(&mut self, i: usize) -> Step {
        let text = self.text;
        if !text[i..].starts_with("{{") {
            return Ok(None);
        }
        match find_close(text.as_bytes(), i, b"{{", b"}}") {
            Some(close) => {
                let template = Node::Template(text[i..close + 2].to_string());
                Ok(self.push(i, Item::Node(template), close + 2))
            }
            None => Ok(None),
        }
    }

    fn bracket(&mut self, i: usize) -> Step {
        let text = self.text;
        if text[i..].starts_with("[[") {
            return self.wikilink(i);
        }

        let rest = &text[i + 1..];
        if !URL_SCHEME.is_match(rest) {
            return Ok(None);
        }
        let Some(close) = rest.find([']', '\n']) else {
            return Ok(None);
        };
        if rest.as_bytes()[close] != b']' {
            return Ok(None);
        }

        let inner = &rest[..close];
        let separator = inner
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(at, c)| (at, c.len_utf8()));
        let (url, label) = match separator {
            Some((space, width)) => {
                let label_start = i + 1 + space + width;
                (&inner[..space], self.nested(label_start, i + 1 + close)?)
            }
            None => (inner, Vec::new()),
        };
        let link = Node::ExternalLink {
            url: url.to_string(),
            label,
        };
        Ok(self.push(i, Item::Node(link), i + 1 + close + 1))
    }

    fn wikilink(&mut self, i: usize) -> Step {
        let text = self.text;
        let Some(close) = find_close(text.as_bytes(), i, b"[[", b"]]") else {
            return Ok(None);
        };
        let inner_start = i + 2;
        let pipes: Vec<usize> = top_level_pipes(&text.as_bytes()[inner_start..close])
            .into_iter()
            .map(|p| inner_start + p)
            .collect();
        let target_end = pipes.first().copied().unwrap_or(close);
        let target = &text[inner_start..target_end];

        let node = if is_media(target) {
            let caption = match pipes.last() {
                Some(&last) if !is_media_option(&text[last + 1..close]) => {
                    self.nested(last + 1, close)?
                }
                _ => Vec::new(),
            };
            Node::Media {
                target: target.to_string(),
                caption,
            }
        } else {
            let label = match pipes.first() {
                Some(&pipe) => Some(self.nested(pipe + 1, close)?),
                None => None,
            };
            Node::Link {
                target: target.to_string(),
                label,
            }
        };

        Ok(self.push(i, Item::Node(node), close + 2))
    }

    fn angle(&mut self, i: usize) -> Step {
        let text = self.text;
        if text[i..].starts_with("<!--") {
            let end = text[i + 4..].find("-->").map_or(text.len(), |p| i + 4 + p + 3);
            let comment = Node::Comment(text[i..end].to_string());
            return Ok(self.push(i, Item::Node(comment), end));
        }

        let Some(tag) = parse_tag(text.as_bytes(), i) else {
            return Ok(None);
        };
        let name = text[tag.name.0..tag.name.1].to_ascii_lowercase();
        if !KNOWN_TAGS.contains(&name.as_str()) {
            return Ok(None);
        }
        if tag.closing || tag.self_closing {
            return Ok(self.skip(i, tag.end));
        }

        let hidden = INVISIBLE_TAGS.contains(&name.as_str());
        if hidden || name == "nowiki" {
            if let Some((close_start, close_end)) =
                find_closing_tag(text.as_bytes(), tag.end, name.as_bytes())
            {
                let body = text[tag.end..close_start].to_string();
                let node = if hidden {
                    Node::Tag { name, body }
                } else {
                    Node::Nowiki(decode_entities(&body).into_owned())
                };
                return Ok(self.push(i, Item::Node(node), close_end));
            }
        }

        // Visible tags vanish; their contents render as ordinary markup.
        Ok(self.skip(i, tag.end))
    }

    /// Bold and italic markers.
    fn quotes(&mut self, i: usize) -> Step {
        let run = self.text.as_bytes()[i..]
            .iter()
            .take_while(|b| **b == b'\'')
            .count();
        if run < 2 {
            return Ok(None);
        }
        let literal = match run {
            4 => 1,
            n if n > 5 => n - 5,
            _ => 0,
        };
        self.flush(i + literal);
        self.text_start = i + run;
        Ok(Some(i + run))
    }

    fn magic_word(&mut self, i: usize) -> Step {
        match MAGIC_WORD.find(&self.text[i..]) {
            Some(m) => Ok(self.skip(i, i + m.end())),
            None => Ok(None),
        }
    }
}

/// Inline nodes of `text`, parsed as the body of a link, heading or table.
fn parse_nodes(text: &str, base: usize, depth: usize) -> Result<Vec<Node>, MarkupError> {
    Ok(Parser::new(text, base, depth, false)?
        .run()?
        .into_iter()
        .filter_map(|item| match item {
            Item::Node(node) => Some(node),
            Item::Heading(_) => None,
        })
        .collect())
}

/// Index of the `close` pair balancing the `open` pair at `start`.
fn find_close(bytes: &[u8], start: usize, open: &[u8; 2], close: &[u8; 2]) -> Option<usize> {
    let mut depth: usize = 0;
    let mut i = start;
    while i + 1 < bytes.len() {
        let pair = &bytes[i..i + 2];
        if pair == open {
            depth += 1;
            i += 2;
        } else if pair == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

/// Pipe positions not enclosed in nested links or templates.
fn top_level_pipes(bytes: &[u8]) -> Vec<usize> {
    let mut pipes = Vec::new();
    let mut depth: usize = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes.get(i..i + 2) {
            Some(b"[[") | Some(b"{{") => {
                depth += 1;
                i += 2;
            }
            Some(b"]]") | Some(b"}}") => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            _ => {
                if bytes[i] == b'|' && depth == 0 {
                    pipes.push(i);
                }
                i += 1;
            }
        }
    }
    pipes
}

/// End offset (exclusive) of a `{| ... |}` table starting at `start`.
fn table_end(text: &str, start: usize) -> Option<usize> {
    let mut depth: usize = 0;
    let mut line_start = start;
    while line_start < text.len() {
        let line_end = text[line_start..]
            .find('\n')
            .map_or(text.len(), |p| line_start + p);
        let line = &text[line_start..line_end];
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim_start();
        if trimmed.starts_with("{|") {
            depth += 1;
        } else if trimmed.starts_with("|}") {
            depth -= 1;
            if depth == 0 {
                return Some(line_start + indent + 2);
            }
        }
        line_start = line_end + 1;
    }
    None
}

/// The readable part of a `{| ... |}` block: every cell's content, cells of a
/// row separated by a space and rows by newlines. Table attributes, row
/// separators and per-cell attributes are gone. Nested tables are copied
/// through as written, starting on their own line.
fn table_cells(block: &str) -> String {
    let mut out = String::with_capacity(block.len());
    let mut depth: usize = 0;
    for line in block.lines() {
        let trimmed = line.trim_start();
        if depth > 1 || (depth == 1 && trimmed.starts_with("{|")) {
            if trimmed.starts_with("{|") {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                depth += 1;
            } else if trimmed.starts_with("|}") {
                depth -= 1;
            }
            out.push_str(line);
            out.push('\n');
        } else if trimmed.starts_with("{|") {
            depth = 1;
        } else if trimmed.starts_with("|}") {
            depth = 0;
        } else if trimmed.starts_with("|-") {
            // rows already end in a newline
        } else if let Some(caption) = trimmed.strip_prefix("|+") {
            push_row(&mut out, caption.split("||"));
        } else if let Some(header) = trimmed.strip_prefix('!') {
            push_row(&mut out, header.split("!!").flat_map(|c| c.split("||")));
        } else if let Some(row) = trimmed.strip_prefix('|') {
            push_row(&mut out, row.split("||"));
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        // `attributes | content`
        let content = match top_level_pipes(cell.as_bytes()).first() {
            Some(&pipe) => &cell[pipe + 1..],
            None => cell,
        }
        .trim();
        if content.is_empty() {
            continue;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(content);
        first = false;
    }
    if !first {
        out.push('\n');
    }
}

/// Removes the `=` markers of anything in `line` that [`Document::parse`]
/// would read as a heading, keeping the title text. `line` is expected to be
/// single-line rendered output, where such markers can only be literal text
/// (decoded `&#61;`, `<nowiki>` contents, quotes or newlines that were
/// stripped away).
pub fn strip_heading_markers(line: &str) -> Cow<'_, str> {
    if !line.contains('=') {
        return Cow::Borrowed(line);
    }
    let mut current = Cow::Borrowed(line);
    while let Some(next) = strip_heading_markers_once(&current) {
        current = Cow::Owned(next);
    }
    current
}

fn strip_heading_markers_once(line: &str) -> Option<String> {
    if let Some(caps) = HEADING_LINE.captures(line) {
        let level = caps[1].len().min(caps[3].len());
        let trimmed = line.trim_end_matches([' ', '\t', '\r']).len();
        if level < trimmed - level {
            return Some(line[level..trimmed - level].to_string());
        }
    }

    let bytes = line.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'=' && matches!(bytes[i - 1], b' ' | b'\t') {
            if let Some(caps) = INLINE_HEADING.captures(&line[i..]) {
                if let (Some(open), Some(title), Some(close)) = (caps.get(1), caps.get(2), caps.get(3))
                {
                    if open.len() == close.len() {
                        out.push_str(&line[copied..i]);
                        out.push_str(title.as_str());
                        copied = i + close.end();
                        i = copied;
                        continue;
                    }
                }
            }
        }
        i += 1;
    }

    if copied == 0 {
        return None;
    }
    out.push_str(&line[copied..]);
    Some(out)
}

struct TagToken {
    name: (usize, usize),
    closing: bool,
    self_closing: bool,
    /// Offset just past the `>`
    end: usize,
}

fn parse_tag(bytes: &[u8], start: usize) -> Option<TagToken> {
    let mut i = start + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    let name_start = i;
    if !bytes.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    let name_end = i;
    match bytes.get(i) {
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
        _ => return None,
    }

    let offset = bytes[i..].iter().position(|b| *b == b'>' || *b == b'<')?;
    let gt = i + offset;
    if bytes[gt] != b'>' {
        return None;
    }

    Some(TagToken {
        name: (name_start, name_end),
        closing,
        self_closing: bytes[gt - 1] == b'/',
        end: gt + 1,
    })
}

/// Start and end (exclusive) of the first `</name>` at or after `from`.
fn find_closing_tag(bytes: &[u8], from: usize, name: &[u8]) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 + name.len() <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + 2 + name.len()].eq_ignore_ascii_case(name)
        {
            let after = i + 2 + name.len();
            let gt = bytes[after..]
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .map(|p| after + p);
            if let Some(gt) = gt.filter(|&gt| bytes[gt] == b'>') {
                return Some((i, gt + 1));
            }
        }
        i += 1;
    }
    None
}

fn is_media(target: &str) -> bool {
    let target = target.trim_start();
    let prefix: String = target.chars().take(6).collect::<String>().to_lowercase();
    prefix.starts_with("file:") || prefix.starts_with("image:")
}

fn is_media_option(segment: &str) -> bool {
    let segment = segment.trim();
    if MEDIA_OPTIONS.contains(&segment) {
        return true;
    }
    if let Some(size) = segment.strip_suffix("px") {
        return !size.is_empty() && size.chars().all(|c| c.is_ascii_digit() || c == 'x');
    }
    match segment.split_once('=') {
        Some((key, _)) => matches!(
            key.trim(),
            "alt" | "link" | "upright" | "page" | "class" | "lang" | "thumb" | "thumbnail"
        ),
        None => false,
    }
}

/// Decodes named and numeric character references; unknown ones stay literal.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| entity(&after[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn entity(name: &str) -> Option<char> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "thinsp" => '\u{2009}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "minus" => '\u{2212}',
        "hellip" => '\u{2026}',
        "times" => '\u{d7}',
        "deg" => '\u{b0}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> String {
        Document::parse(text).unwrap().to_plain_text()
    }

    fn titles(doc: &Document) -> Vec<&str> {
        doc.headings().iter().map(|h| h.title.trim()).collect()
    }

    #[test]
    fn lead_only_document() {
        let doc = Document::parse("Just a paragraph.").unwrap();
        assert!(doc.sections.is_empty());
        assert_eq!(doc.to_plain_text(), "Just a paragraph.");
    }

    #[test]
    fn sections_nest_by_level() {
        let doc =
            Document::parse("Intro\n== A ==\na\n=== A1 ===\na1\n== B ==\nb\n").unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading.title.trim(), "A");
        assert_eq!(doc.sections[0].subsections.len(), 1);
        assert_eq!(doc.sections[0].subsections[0].heading.level, 3);
        assert_eq!(doc.sections[1].heading.title.trim(), "B");
        assert_eq!(titles(&doc), vec!["A", "A1", "B"]);
    }

    #[test]
    fn uneven_markers_use_the_shorter_run() {
        let doc = Document::parse("=== Odd ==\nbody").unwrap();
        assert_eq!(doc.sections[0].heading.level, 2);
        assert_eq!(doc.sections[0].heading.title.trim(), "= Odd");
    }

    #[test]
    fn tight_inline_heading_starts_a_section() {
        let doc = Document::parse("Intro text. ==References== refs").unwrap();
        assert_eq!(titles(&doc), vec!["References"]);
    }

    #[test]
    fn equals_in_prose_is_not_a_heading() {
        let doc = Document::parse("Where x == y holds and a=b.").unwrap();
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn headings_inside_templates_are_ignored() {
        let doc = Document::parse("{{Infobox\n== Not a heading ==\n}}\nLead").unwrap();
        assert!(doc.sections.is_empty());
        assert_eq!(doc.to_plain_text(), "\nLead");
    }

    #[test]
    fn heading_titles_render_as_text() {
        assert_eq!(plain("== History ==\nOld."), "History\nOld.");
    }

    #[test]
    fn excluded_section_drops_body_and_children() {
        let doc = Document::parse(
            "Lead.\n== References ==\nref\n=== Sub ===\nsub\n== After ==\nafter",
        )
        .unwrap();
        let text = doc.render(&Exclusions {
            headings: &["References"],
            link_prefixes: &[],
        });
        assert!(text.contains("Lead."));
        assert!(!text.contains("ref"));
        assert!(!text.contains("sub"));
        assert!(text.contains("after"));
    }

    #[test]
    fn excluded_subheading_drops_parent_section() {
        let doc = Document::parse("Lead.\n== History ==\nhist\n=== Notes ===\nnote\n").unwrap();
        let text = doc.render(&Exclusions {
            headings: &["Notes"],
            link_prefixes: &[],
        });
        assert_eq!(text.trim(), "Lead.");
    }

    #[test]
    fn heading_match_is_exact_and_case_sensitive() {
        let doc = Document::parse("Lead.\n== references ==\nkept\n== References list ==\nalso kept")
            .unwrap();
        let text = doc.render(&Exclusions {
            headings: &["References"],
            link_prefixes: &[],
        });
        assert!(text.contains("kept"));
        assert!(text.contains("also kept"));
    }

    #[test]
    fn links_render_label_or_target() {
        assert_eq!(plain("[[Rust]] and [[C++|C plus plus]]"), "Rust and C plus plus");
    }

    #[test]
    fn link_prefix_exclusion() {
        let doc = Document::parse("A [[Category:Foo]] B [[Category:Bar|sort]] [[Cat]]").unwrap();
        let text = doc.render(&Exclusions {
            headings: &[],
            link_prefixes: &["Category:"],
        });
        assert_eq!(text, "A  B  Cat");
    }

    #[test]
    fn media_links_keep_caption_only() {
        assert_eq!(plain("[[File:Rust logo.svg|thumb|200px|The [[Rust]] logo]]"), "The Rust logo");
        assert_eq!(plain("[[Image:Logo.png|thumb]]"), "");
    }

    #[test]
    fn external_links_keep_label() {
        assert_eq!(plain("[https://www.rust-lang.org Official website]"), "Official website");
        assert_eq!(plain("see [https://example.com]"), "see ");
        assert_eq!(plain("bare https://example.com url"), "bare https://example.com url");
    }

    #[test]
    fn templates_and_comments_are_dropped_table_cells_kept() {
        let text = plain("A{{cite web|url=x}}B<!-- hidden -->C\n{|\n| cell\n|}\nD");
        assert_eq!(text, "ABC\ncell\n\nD");
    }

    #[test]
    fn table_markup_and_attributes_are_dropped() {
        let text = plain(
            "{| class=\"wikitable\"\n\
             |+ Releases\n\
             ! scope=\"col\" | Year !! Title\n\
             |-\n\
             | style=\"text-align:left\" | 1999 || [[Album One|One]]\n\
             |-\n\
             | 2003 || Two{{ref|x}}\n\
             |}",
        );
        assert_eq!(text, "Releases\nYear Title\n1999 One\n2003 Two\n");
    }

    #[test]
    fn nested_table_cells_are_kept() {
        let text = plain("{|\n| outer\n|-\n|\n{|\n| inner\n|}\n|}\nafter");
        assert!(text.contains("outer"), "{:?}", text);
        assert!(text.contains("inner"), "{:?}", text);
        assert!(text.contains("after"), "{:?}", text);
        assert!(!text.contains('|'), "{:?}", text);
        assert!(!text.contains('{'), "{:?}", text);
    }

    #[test]
    fn table_without_close_is_literal() {
        let text = plain("{|\n| cell");
        assert_eq!(text, "{|\n| cell");
    }

    #[test]
    fn heading_markers_in_literal_text_are_stripped() {
        assert_eq!(strip_heading_markers("Intro ==Notes== tail."), "Intro Notes tail.");
        assert_eq!(strip_heading_markers("== Notes =="), " Notes ");
        assert_eq!(strip_heading_markers("a ==b=== c"), "a ==b=== c");
        assert_eq!(strip_heading_markers("x=1 and y==2"), "x=1 and y==2");
        assert_eq!(strip_heading_markers("==lead== text"), "==lead== text");
        assert!(matches!(strip_heading_markers("no markers"), Cow::Borrowed(_)));
    }

    #[test]
    fn nested_templates_are_dropped() {
        assert_eq!(plain("{{outer {{inner}} end}} text"), " text");
    }

    #[test]
    fn unclosed_constructs_are_literal() {
        assert_eq!(plain("{{unclosed"), "{{unclosed");
        assert_eq!(plain("[[unclosed"), "[[unclosed");
    }

    #[test]
    fn refs_are_hidden_but_formatting_tags_keep_contents() {
        let text = plain("Fact.<ref name=\"a\">Source</ref> More<ref name=\"a\" /> <small>tiny</small>");
        assert_eq!(text, "Fact. More tiny");
    }

    #[test]
    fn nowiki_is_literal() {
        assert_eq!(plain("<nowiki>[[not a link]]</nowiki>"), "[[not a link]]");
    }

    #[test]
    fn unknown_angle_brackets_are_text() {
        assert_eq!(plain("a <x and y> z"), "a <x and y> z");
        assert_eq!(plain("1 < 2"), "1 < 2");
    }

    #[test]
    fn bold_and_italic_markers_are_dropped() {
        assert_eq!(plain("'''Rust''' is ''fast''"), "Rust is fast");
        assert_eq!(plain("it's"), "it's");
    }

    #[test]
    fn list_markers_and_rules_are_dropped() {
        assert_eq!(plain("* one\n# two\n----\n: three"), " one\n two\n\n three");
    }

    #[test]
    fn magic_words_are_dropped() {
        assert_eq!(plain("__NOTOC__Text"), "Text");
    }

    #[test]
    fn excess_newlines_collapse() {
        assert_eq!(plain("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &ndash; &#65;&#x42; &bogus; &"), "a & b \u{2013} AB &bogus; &");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let depth = MAX_NESTING_DEPTH + 2;
        let mut text = String::new();
        for _ in 0..depth {
            text.push_str("[[a|");
        }
        text.push('x');
        for _ in 0..depth {
            text.push_str("]]");
        }
        assert!(matches!(
            Document::parse(&text),
            Err(MarkupError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn moderate_nesting_is_fine() {
        assert_eq!(plain("[[a|[[b|[[c|deep]]]]]]"), "deep");
    }

    #[test]
    fn non_ascii_text_survives() {
        assert_eq!(plain("Zürich ''über'' [[Köln|Kölle]] 東京"), "Zürich über Kölle 東京");
    }
}
