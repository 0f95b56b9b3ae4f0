//! Subject, recipient and body extraction.
//!
//! Every extractor is total: a missing node yields an empty value rather
//! than an error, so an extraction gap never blocks the send.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::classify::{is_editable_region, is_message_body, is_subject_input};
use super::snapshot::DomNode;

static RECIPIENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\n]+").expect("Failed to compile recipient split regex"));

static EMPTY_SCAFFOLDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&nbsp;|\s|\u{a0}|<br\s*/?>")
        .expect("Failed to compile body scaffolding regex")
});

/// First non-empty subject among the canonical subject input and any
/// aria-labeled fallback.
pub fn extract_subject(root: &DomNode) -> String {
    root.descendants()
        .filter(|n| is_subject_input(n))
        .filter_map(|n| n.value.as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn is_recipient_field(node: &DomNode) -> bool {
    match node.tag.as_str() {
        "textarea" => node.attr("name") == Some("to"),
        "input" => node.attr("type") == Some("email") || node.attr("name") == Some("to"),
        "div" => node.aria_label() == Some("To"),
        _ => false,
    }
}

/// Recipient addresses from attribute-tagged chips and "to" controls,
/// deduplicated, in first-seen order.
pub fn extract_recipients(root: &DomNode) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |addr: &str| {
        let addr = addr.trim();
        if !addr.is_empty() && seen.insert(addr.to_string()) {
            out.push(addr.to_string());
        }
    };

    for chip in root.descendants().filter(|n| n.has_attr("email")) {
        if let Some(addr) = chip.attr("email") {
            push(addr);
        }
    }

    for field in root.descendants().filter(|n| is_recipient_field(n)) {
        let raw = field
            .value
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| Some(field.text_content()).filter(|t| !t.trim().is_empty()))
            .or_else(|| field.attr("data-legacy-email").map(str::to_string));
        if let Some(raw) = raw {
            for part in RECIPIENT_SPLIT.split(&raw) {
                push(part);
            }
        }
    }

    out
}

/// The editable body node: the labeled message body first, then any
/// editable region.
pub fn find_body_node(root: &DomNode) -> Option<&DomNode> {
    root.find(is_message_body)
        .or_else(|| root.find(is_editable_region))
}

/// Markup consisting only of whitespace, line breaks and non-breaking spaces.
pub fn is_effectively_empty(markup: &str) -> bool {
    EMPTY_SCAFFOLDING.replace_all(markup, "").trim().is_empty()
}

/// Body markup of an editable node, normalized to empty when it only holds
/// formatting scaffolding.
pub fn body_markup(body: &DomNode) -> String {
    match body.inner_html.as_deref() {
        Some(html) if !is_effectively_empty(html) => html.to_string(),
        _ => String::new(),
    }
}
