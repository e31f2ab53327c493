use crate::config::ARTICLE_URL_PREFIX;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageType {
    Article,
    Redirect(String),
    Special,
}

/// One `<page>` element as it appears in the dump.
#[derive(Debug, Clone)]
pub struct WikiPage {
    pub id: u64,
    pub title: String,
    pub ns: Option<i32>,
    pub page_type: PageType,
    /// Text of the last revision in document order
    pub text: Option<String>,
}

/// An eligible page on its way to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub id: u64,
    pub title: String,
    pub raw_text: String,
}

/// One output record. Field order is the JSON key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanArticle {
    pub id: u64,
    pub title: String,
    pub text: String,
    pub url: String,
}

impl CleanArticle {
    pub fn new(id: u64, title: String, text: String) -> Self {
        Self {
            id,
            title,
            text,
            url: article_url(id),
        }
    }
}

pub fn article_url(id: u64) -> String {
    format!("{}{}", ARTICLE_URL_PREFIX, id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub number: u32,
    pub articles: Vec<CleanArticle>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}
