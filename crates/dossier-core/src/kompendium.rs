//! Knowledge-base articles grouped by category

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DomainResult;
use crate::text;

pub const TITLE_MAX_CHARS: usize = 200;
pub const CATEGORY_MAX_CHARS: usize = 60;

/// Validated fields of a kompendium article
#[derive(Debug, Clone, PartialEq)]
pub struct DocContent {
    pub title: String,
    pub category: String,
    pub content: String,
}

impl DocContent {
    pub fn new(title: &str, category: &str, content: &str) -> DomainResult<Self> {
        Ok(Self {
            title: text::required_line("Title", title, TITLE_MAX_CHARS)?,
            category: normalize_category(category)?,
            content: content.to_string(),
        })
    }
}

/// Trim and collapse inner whitespace so "  Recht   BtMG" == "Recht BtMG"
pub fn normalize_category(category: &str) -> DomainResult<String> {
    let collapsed = category.split_whitespace().collect::<Vec<_>>().join(" ");
    text::required_line("Category", &collapsed, CATEGORY_MAX_CHARS)
}

/// Anything that can be listed in the kompendium index
pub trait Indexed {
    fn category(&self) -> &str;
    fn position(&self) -> i64;
    fn title(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup<T> {
    pub category: String,
    pub docs: Vec<T>,
}

/// Group docs by category (alphabetical, case-insensitive) and order each
/// group by position, then title
pub fn group_by_category<T: Indexed>(docs: Vec<T>) -> Vec<CategoryGroup<T>> {
    let mut groups: BTreeMap<String, (String, Vec<T>)> = BTreeMap::new();
    for doc in docs {
        let key = doc.category().to_lowercase();
        groups
            .entry(key)
            .or_insert_with(|| (doc.category().to_string(), Vec::new()))
            .1
            .push(doc);
    }

    groups
        .into_values()
        .map(|(category, mut docs)| {
            docs.sort_by(|a, b| {
                a.position()
                    .cmp(&b.position())
                    .then_with(|| a.title().to_lowercase().cmp(&b.title().to_lowercase()))
            });
            CategoryGroup { category, docs }
        })
        .collect()
}
