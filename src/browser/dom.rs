// src/browser/dom.rs

//! Static DOM queries over an HTML string.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use super::{Ancestor, CONTEXT_TAGS, Element};
use crate::error::{AppError, Result};

const MAX_CONTEXT_CHARS: usize = 500;

/// Parse a CSS selector, mapping failures into [`AppError::Selector`].
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Run `selector` over `html` and snapshot every match in document order.
pub fn select(html: &str, selector: &str) -> Result<Vec<Element>> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).map(snapshot).collect())
}

/// Text of the document's `<title>`.
pub fn title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|t| normalize_text(t.text()))
        .unwrap_or_default()
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn attrs_of(el: &ElementRef) -> BTreeMap<String, String> {
    el.value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn snapshot(el: ElementRef) -> Element {
    let ancestors: Vec<ElementRef> = el.ancestors().filter_map(ElementRef::wrap).collect();

    let context_text = ancestors
        .iter()
        .find(|a| CONTEXT_TAGS.contains(&a.value().name()))
        .map(|a| {
            normalize_text(a.text())
                .chars()
                .take(MAX_CONTEXT_CHARS)
                .collect()
        })
        .unwrap_or_default();

    Element {
        tag: el.value().name().to_lowercase(),
        attrs: attrs_of(&el),
        text: normalize_text(el.text()),
        context_text,
        ancestors: ancestors
            .iter()
            .map(|a| Ancestor {
                tag: a.value().name().to_lowercase(),
                attrs: attrs_of(a),
            })
            .collect(),
        path: node_path(&el),
    }
}

fn node_path(el: &ElementRef) -> Vec<usize> {
    let mut path = Vec::new();
    let mut node = **el;
    while let Some(parent) = node.parent() {
        let index = parent
            .children()
            .position(|c| c.id() == node.id())
            .unwrap_or_default();
        path.push(index);
        node = parent;
    }
    path.reverse();
    path
}
