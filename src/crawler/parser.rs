//! Relation extractor
//!
//! This module parses fetched HTML for elements whose `rel` attribute carries
//! a recognized token and maps them to identity-graph edge kinds:
//! - `canonical` on `<link>` elements becomes an `alias` edge
//! - `me` on `<link>` or `<a>` elements becomes a `me` edge
//! - `contact` becomes a `friend` edge when XFN crawling is enabled
//! - `alternate` feed links become `feed` edges when feed crawling is enabled
//!
//! The set of relation types is a static table built once from
//! configuration and iterated uniformly.

use crate::config::CrawlerConfig;
use crate::graph::EdgeKind;
use crate::url::validate_url;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::trace;
use url::Url;

/// Feed MIME types accepted for `rel="alternate"`
pub const FEED_TYPES: &[&str] = &[
    "application/atom+xml",
    "application/rss+xml",
    "application/activitystream+json",
];

/// Descriptor of one recognized relation token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationType {
    /// The `rel` token looked for in the document
    pub rel: &'static str,
    /// Edge kind the relation is stored as
    pub kind: EdgeKind,
    /// Only `<link>` elements in `<head>` count, not anchors
    pub links_only: bool,
    /// When set, the element's `type` attribute must be one of these
    pub allowed_types: Option<&'static [&'static str]>,
}

impl RelationType {
    /// Builds the relation table for this configuration
    pub fn table(config: &CrawlerConfig) -> Vec<RelationType> {
        let mut types = vec![
            RelationType {
                rel: "canonical",
                kind: EdgeKind::Alias,
                links_only: true,
                allowed_types: None,
            },
            RelationType {
                rel: "me",
                kind: EdgeKind::Me,
                links_only: false,
                allowed_types: None,
            },
        ];

        if config.crawl_xfn {
            types.push(RelationType {
                rel: "contact",
                kind: EdgeKind::Friend,
                links_only: false,
                allowed_types: None,
            });
        }

        if config.crawl_feeds {
            types.push(RelationType {
                rel: "alternate",
                kind: EdgeKind::Feed,
                links_only: true,
                allowed_types: Some(FEED_TYPES),
            });
        }

        types
    }

    fn selector(&self) -> String {
        let link = format!("head > link[rel~=\"{}\"]", self.rel);
        if self.links_only {
            link
        } else {
            format!("{}, a[rel~=\"{}\"]", link, self.rel)
        }
    }

    fn accepts(&self, element: &ElementRef<'_>) -> bool {
        let Some(allowed) = self.allowed_types else {
            return true;
        };

        element
            .value()
            .attr("type")
            .map(|t| {
                let media = t.split(';').next().unwrap_or("").trim();
                allowed.iter().any(|a| a.eq_ignore_ascii_case(media))
            })
            .unwrap_or(false)
    }
}

/// Relations found on one page: per edge kind, target URL to anchor texts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    by_kind: BTreeMap<EdgeKind, BTreeMap<String, Vec<String>>>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single relation synthesized for a redirect response
    ///
    /// A 301 points at the canonical form of the page; any other redirect
    /// points at another page of the same identity.
    pub fn from_redirect(status: u16, location: &Url) -> Self {
        let kind = if status == 301 {
            EdgeKind::Alias
        } else {
            EdgeKind::Me
        };

        let mut relations = Self::new();
        relations.insert(kind, location.as_str(), None);
        relations
    }

    /// Records a target, collecting distinct anchor texts
    pub fn insert(&mut self, kind: EdgeKind, target: &str, text: Option<&str>) {
        let texts = self
            .by_kind
            .entry(kind)
            .or_default()
            .entry(target.to_string())
            .or_default();

        if let Some(text) = text {
            if !texts.iter().any(|t| t == text) {
                texts.push(text.to_string());
            }
        }
    }

    /// Drops `url` from every kind
    pub fn remove_target(&mut self, url: &str) {
        for targets in self.by_kind.values_mut() {
            targets.remove(url);
        }
    }

    pub fn contains(&self, kind: EdgeKind, target: &str) -> bool {
        self.by_kind
            .get(&kind)
            .map(|targets| targets.contains_key(target))
            .unwrap_or(false)
    }

    /// Targets of `kind`, sorted
    pub fn targets(&self, kind: EdgeKind) -> impl Iterator<Item = &str> + '_ {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flat_map(|targets| targets.keys().map(String::as_str))
    }

    /// Anchor texts recorded for a target
    pub fn texts(&self, kind: EdgeKind, target: &str) -> &[String] {
        self.by_kind
            .get(&kind)
            .and_then(|targets| targets.get(target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of (kind, target) pairs
    pub fn len(&self) -> usize {
        self.by_kind.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parses documents with a fixed relation table
#[derive(Debug, Clone)]
pub struct RelationExtractor {
    types: Vec<RelationType>,
}

impl RelationExtractor {
    pub fn new(types: Vec<RelationType>) -> Self {
        Self { types }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(RelationType::table(config))
    }

    pub fn types(&self) -> &[RelationType] {
        &self.types
    }

    /// Edge kinds produced by the enabled relation types
    pub fn kinds(&self) -> Vec<EdgeKind> {
        self.types.iter().map(|t| t.kind).collect()
    }

    /// Extracts every enabled relation from `html`
    ///
    /// Targets are resolved against `page`; targets equal to `page` and
    /// targets that are not valid web URLs are skipped.
    pub fn extract(&self, html: &str, page: &Url) -> Relations {
        let document = Html::parse_document(html);
        let mut relations = Relations::new();

        for relation in &self.types {
            let Ok(selector) = Selector::parse(&relation.selector()) else {
                continue;
            };

            let mut found = 0;
            for element in document.select(&selector) {
                found += 1;

                if !relation.accepts(&element) {
                    continue;
                }

                let Some(href) = element.value().attr("href") else {
                    continue;
                };

                let Some(target) = resolve_link(href, page) else {
                    continue;
                };

                if target == page.as_str() {
                    continue;
                }

                let text = element.text().collect::<String>();
                let text = text.trim();
                relations.insert(
                    relation.kind,
                    &target,
                    (!text.is_empty()).then_some(text),
                );
            }

            trace!("...found {} \"{}\" relations on {}", found, relation.rel, page);
        }

        relations
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - URLs that fail validation after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    validate_url(absolute.as_str()).ok().map(String::from)
}
