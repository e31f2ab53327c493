use crate::config::MAIN_NAMESPACE;
use crate::models::{PageType, RawPage, WikiPage};
use crate::parser::DumpReader;
use crate::stats::ExtractionStats;
use anyhow::Result;
use std::path::Path;
use tracing::trace;

/// Why a page never reaches the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Namespace,
    Redirect,
    NoText,
}

/// Applies the eligibility rules to one dump page.
pub fn eligible(page: WikiPage) -> Result<RawPage, Skip> {
    if page.ns != Some(MAIN_NAMESPACE) {
        return Err(Skip::Namespace);
    }
    if matches!(page.page_type, PageType::Redirect(_)) {
        return Err(Skip::Redirect);
    }
    match page.text {
        Some(text) if !text.is_empty() => Ok(RawPage {
            id: page.id,
            title: page.title,
            raw_text: text,
        }),
        _ => Err(Skip::NoText),
    }
}

/// Lazy, single-pass sequence of eligible pages.
///
/// Pulls one page at a time from the underlying reader, so nothing beyond the
/// current page is buffered here.
pub struct PageSource<'a, I> {
    pages: I,
    stats: &'a ExtractionStats,
    limit: Option<u64>,
    yielded: u64,
}

impl<'a> PageSource<'a, DumpReader> {
    pub fn open(path: impl AsRef<Path>, stats: &'a ExtractionStats) -> Result<Self> {
        Ok(Self::new(DumpReader::open(path)?, stats))
    }
}

impl<'a, I> PageSource<'a, I>
where
    I: Iterator<Item = Result<WikiPage>>,
{
    pub fn new(pages: I, stats: &'a ExtractionStats) -> Self {
        Self {
            pages,
            stats,
            limit: None,
            yielded: 0,
        }
    }

    /// Stop after `limit` eligible pages.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }
}

impl<I> Iterator for PageSource<'_, I>
where
    I: Iterator<Item = Result<WikiPage>>,
{
    type Item = Result<RawPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return None;
        }

        loop {
            let page = match self.pages.next()? {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            self.stats.inc_pages_seen();

            let id = page.id;
            match eligible(page) {
                Ok(raw) => {
                    self.stats.inc_eligible();
                    self.yielded += 1;
                    return Some(Ok(raw));
                }
                Err(reason) => {
                    trace!(page_id = id, ?reason, "Skipping page");
                    match reason {
                        Skip::Namespace => self.stats.inc_skipped_namespace(),
                        Skip::Redirect => self.stats.inc_skipped_redirect(),
                        Skip::NoText => self.stats.inc_skipped_empty(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: u64, ns: Option<i32>, page_type: PageType, text: Option<&str>) -> WikiPage {
        WikiPage {
            id,
            title: format!("Page {}", id),
            ns,
            page_type,
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn article_with_text_is_eligible() {
        let raw = eligible(page(1, Some(0), PageType::Article, Some("body"))).unwrap();
        assert_eq!(raw.id, 1);
        assert_eq!(raw.title, "Page 1");
        assert_eq!(raw.raw_text, "body");
    }

    #[test]
    fn other_namespaces_are_skipped() {
        for ns in [1, 2, 4, 6, 10, 14, 100, -1] {
            let result = eligible(page(1, Some(ns), PageType::Special, Some("body")));
            assert_eq!(result.unwrap_err(), Skip::Namespace);
        }
        let result = eligible(page(1, None, PageType::Special, Some("body")));
        assert_eq!(result.unwrap_err(), Skip::Namespace);
    }

    #[test]
    fn redirects_are_skipped() {
        let result = eligible(page(1, Some(0), PageType::Redirect("X".into()), Some("#REDIRECT")));
        assert_eq!(result.unwrap_err(), Skip::Redirect);
    }

    #[test]
    fn missing_or_empty_text_is_skipped() {
        assert_eq!(
            eligible(page(1, Some(0), PageType::Article, None)).unwrap_err(),
            Skip::NoText
        );
        assert_eq!(
            eligible(page(1, Some(0), PageType::Article, Some(""))).unwrap_err(),
            Skip::NoText
        );
    }

    #[test]
    fn source_filters_and_counts() {
        let stats = ExtractionStats::new();
        let pages = vec![
            Ok(page(1, Some(0), PageType::Article, Some("a"))),
            Ok(page(2, Some(1), PageType::Special, Some("talk"))),
            Ok(page(3, Some(0), PageType::Redirect("A".into()), Some("#REDIRECT"))),
            Ok(page(4, Some(0), PageType::Article, None)),
            Ok(page(5, Some(0), PageType::Article, Some("b"))),
        ];

        let ids: Vec<u64> = PageSource::new(pages.into_iter(), &stats)
            .map(|r| r.unwrap().id)
            .collect();

        assert_eq!(ids, vec![1, 5]);
        assert_eq!(stats.pages(), 5);
        assert_eq!(stats.eligible(), 2);
        assert_eq!(stats.skipped_namespace(), 1);
        assert_eq!(stats.skipped_redirect(), 1);
        assert_eq!(stats.skipped_empty(), 1);
    }

    #[test]
    fn limit_counts_eligible_pages_only() {
        let stats = ExtractionStats::new();
        let pages = vec![
            Ok(page(1, Some(2), PageType::Special, Some("user"))),
            Ok(page(2, Some(0), PageType::Article, Some("a"))),
            Ok(page(3, Some(0), PageType::Article, Some("b"))),
            Ok(page(4, Some(0), PageType::Article, Some("c"))),
        ];

        let ids: Vec<u64> = PageSource::new(pages.into_iter(), &stats)
            .with_limit(Some(2))
            .map(|r| r.unwrap().id)
            .collect();

        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn reader_errors_pass_through() {
        let stats = ExtractionStats::new();
        let pages = vec![
            Ok(page(1, Some(0), PageType::Article, Some("a"))),
            Err(anyhow::anyhow!("broken")),
        ];
        let results: Vec<_> = PageSource::new(pages.into_iter(), &stats).collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
