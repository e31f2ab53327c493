use crate::config::{CATEGORY_PREFIX, SECTION_DENYLIST};
use crate::error::CleanError;
use crate::markup::{strip_heading_markers, Document, Exclusions};
use crate::models::{CleanArticle, RawPage};

const EXCLUSIONS: Exclusions<'static> = Exclusions {
    headings: &SECTION_DENYLIST,
    link_prefixes: &[CATEGORY_PREFIX],
};

/// Turns one raw page into an article, or `None` when nothing readable is left.
///
/// Denylisted sections and category links are dropped before rendering. The
/// result is flattened to a single line with every `"` removed so that it can be
/// embedded in JSON lines without escapes for either. Cleaning the result
/// again gives the same text.
pub fn clean_article(page: &RawPage) -> Result<Option<CleanArticle>, CleanError> {
    let text = clean_text(&page.raw_text)?;
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(CleanArticle::new(page.id, page.title.clone(), text)))
}

/// The text half of [`clean_article`].
pub fn clean_text(raw: &str) -> Result<String, CleanError> {
    let document = Document::parse(raw)?;
    let rendered = document.render(&EXCLUSIONS);
    Ok(normalize(&rendered))
}

/// One line, no `"`, and no leftover `==X==` that a second pass would take
/// for a heading.
fn normalize(rendered: &str) -> String {
    let mut text = rendered.trim().replace('\n', " ").replace('"', "");
    loop {
        let next = strip_heading_markers(&text).trim().to_string();
        if next == text {
            return text;
        }
        text = next;
    }
}
