use crate::models::{PageType, WikiPage};
use anyhow::{anyhow, bail, Context, Result};
use bzip2::read::MultiBzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Reader over a dump opened from disk, compressed or not.
pub type DumpReader = WikiReader<Box<dyn BufRead + Send>>;

/// Streams `<page>` elements out of a MediaWiki XML export one at a time.
///
/// Only the page currently being assembled is held in memory; revision text of
/// earlier revisions is overwritten as later ones arrive.
pub struct WikiReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: PageState,
    done: bool,
}

impl DumpReader {
    /// Opens `path`, decoding bzip2 (including multistream dumps) for `.bz2` files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open wiki dump at: {}", path.display()))?;

        let inner: Box<dyn BufRead + Send> =
            if path.extension().is_some_and(|ext| ext == "bz2") {
                Box::new(BufReader::with_capacity(
                    READ_BUFFER_SIZE,
                    MultiBzDecoder::new(file),
                ))
            } else {
                Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
            };

        Ok(WikiReader::from_reader(inner))
    }
}

impl<R: BufRead> WikiReader<R> {
    pub fn from_reader(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::with_capacity(64 * 1024),
            state: PageState::default(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for WikiReader<R> {
    type Item = Result<WikiPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            let result = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Eof) => {
                    self.done = true;
                    return self.state.at_eof().map(Err);
                }
                Ok(event) => self.state.handle(event),
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(Some(page)) => return Some(Ok(page)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    let position = self.reader.buffer_position();
                    return Some(Err(
                        e.context(format!("Malformed dump XML near byte {}", position))
                    ));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Page,
    Title,
    Ns,
    Id,
    Redirect,
    Revision,
    Text,
    Other,
}

impl Element {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"page" => Element::Page,
            b"title" => Element::Title,
            b"ns" => Element::Ns,
            b"id" => Element::Id,
            b"redirect" => Element::Redirect,
            b"revision" => Element::Revision,
            b"text" => Element::Text,
            _ => Element::Other,
        }
    }
}

#[derive(Default)]
struct PageBuilder {
    id: Option<u64>,
    title: String,
    ns: Option<i32>,
    redirect: Option<String>,
    revision_text: Option<String>,
}

impl PageBuilder {
    fn build(self) -> Result<WikiPage> {
        let id = self
            .id
            .ok_or_else(|| anyhow!("Page {:?} has no <id>", self.title))?;

        let page_type = match self.redirect {
            Some(target) => PageType::Redirect(target),
            None if self.ns == Some(crate::config::MAIN_NAMESPACE) => PageType::Article,
            None => PageType::Special,
        };

        Ok(WikiPage {
            id,
            title: self.title,
            ns: self.ns,
            page_type,
            text: self.revision_text,
        })
    }
}

/// Element stack plus the page under construction.
#[derive(Default)]
struct PageState {
    stack: Vec<Element>,
    page: Option<PageBuilder>,
    field: String,
}

impl PageState {
    fn top(&self) -> Option<Element> {
        self.stack.last().copied()
    }

    fn parent(&self) -> Option<Element> {
        self.stack.len().checked_sub(2).map(|i| self.stack[i])
    }

    /// True while inside an element whose character data we keep.
    fn capturing(&self) -> bool {
        if self.page.is_none() {
            return false;
        }
        matches!(
            (self.parent(), self.top()),
            (Some(Element::Page), Some(Element::Title | Element::Ns | Element::Id))
                | (Some(Element::Revision), Some(Element::Text))
        )
    }

    fn handle(&mut self, event: Event<'_>) -> Result<Option<WikiPage>> {
        match event {
            Event::Start(e) => {
                let element = Element::from_name(e.local_name().as_ref());
                self.open(element, &e)?;
                self.stack.push(element);
                self.field.clear();
            }
            Event::Empty(e) => {
                let element = Element::from_name(e.local_name().as_ref());
                self.open(element, &e)?;
            }
            Event::Text(t) => {
                if self.capturing() {
                    self.field.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if self.capturing() {
                    self.field.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => return self.close(),
            _ => {}
        }
        Ok(None)
    }

    fn open(&mut self, element: Element, start: &BytesStart<'_>) -> Result<()> {
        let in_page = self.top() == Some(Element::Page);
        match element {
            Element::Page => self.page = Some(PageBuilder::default()),
            Element::Redirect if in_page => {
                let target = match start.try_get_attribute("title")? {
                    Some(attr) => attr.unescape_value()?.into_owned(),
                    None => String::new(),
                };
                if let Some(page) = self.page.as_mut() {
                    page.redirect = Some(target);
                }
            }
            Element::Revision if in_page => {
                // A later revision replaces whatever an earlier one carried.
                if let Some(page) = self.page.as_mut() {
                    page.revision_text = None;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) -> Result<Option<WikiPage>> {
        let parent = self.parent();
        let Some(element) = self.stack.pop() else {
            bail!("Closing tag without matching start");
        };

        let Some(page) = self.page.as_mut() else {
            return Ok(None);
        };

        match (parent, element) {
            (Some(Element::Page), Element::Title) => {
                page.title = std::mem::take(&mut self.field);
            }
            (Some(Element::Page), Element::Ns) => {
                let raw = self.field.trim();
                let ns = raw
                    .parse::<i32>()
                    .with_context(|| format!("Invalid namespace {:?}", raw))?;
                page.ns = Some(ns);
            }
            (Some(Element::Page), Element::Id) => {
                let raw = self.field.trim();
                let id = raw
                    .parse::<u64>()
                    .with_context(|| format!("Invalid page id {:?}", raw))?;
                page.id = Some(id);
            }
            (Some(Element::Revision), Element::Text) => {
                page.revision_text = Some(std::mem::take(&mut self.field));
            }
            (_, Element::Page) => {
                self.field.clear();
                if let Some(builder) = self.page.take() {
                    return builder.build().map(Some);
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn at_eof(&self) -> Option<anyhow::Error> {
        self.page
            .as_ref()
            .map(|page| anyhow!("Dump ended inside page {:?}", page.title))
    }
}
