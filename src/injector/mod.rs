//! Tracking-artifact injection into an outgoing body.
//!
//! Operates on the markup captured at send time. The pixel is appended at most
//! once per body; each trackable anchor gets its own rewrite round trip and
//! results are applied in completion order.

use std::sync::{Mutex, PoisonError};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::relay::TrackingRelay;

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\shref\s*=\s*("([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .expect("Failed to compile anchor href regex")
});

/// One anchor found in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Position among all anchors with an href, in document order.
    pub index: usize,
    /// Entity-decoded href value.
    pub href: String,
}

/// Only absolute http(s) targets can be redirected through the click endpoint.
pub fn is_trackable(href: &str) -> bool {
    let href = href.trim().to_ascii_lowercase();
    href.starts_with("http://") || href.starts_with("https://")
}

/// All anchor targets in `markup`, in document order.
pub fn extract_links(markup: &str) -> Vec<LinkRef> {
    ANCHOR_HREF
        .captures_iter(markup)
        .enumerate()
        .filter_map(|(index, caps)| {
            let raw = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
            Some(LinkRef {
                index,
                href: html_escape::decode_html_entities(raw.as_str()).into_owned(),
            })
        })
        .collect()
}

fn pixel_tag(url: &str) -> String {
    format!(
        r#"<img src="{}" alt="" width="1" height="1" style="width:1px;height:1px;opacity:0;display:inline-block">"#,
        html_escape::encode_double_quoted_attribute(url)
    )
}

/// The outgoing body of one send, plus its idempotency flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedBody {
    markup: String,
    pixel_injected: bool,
}

impl TrackedBody {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            pixel_injected: false,
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn pixel_injected(&self) -> bool {
        self.pixel_injected
    }

    /// Append the invisible pixel. Returns `false` if one was already added.
    pub fn inject_pixel(&mut self, url: &str) -> bool {
        if self.pixel_injected {
            return false;
        }
        self.markup.push_str(&pixel_tag(url));
        self.pixel_injected = true;
        true
    }

    pub fn links(&self) -> Vec<LinkRef> {
        extract_links(&self.markup)
    }

    /// Point anchor `index` at `replacement`, provided it still targets
    /// `expected`. Returns whether the markup changed.
    pub fn replace_link(&mut self, index: usize, expected: &str, replacement: &str) -> bool {
        let Some(caps) = ANCHOR_HREF.captures_iter(&self.markup).nth(index) else {
            return false;
        };
        let Some(value) = caps.get(1) else {
            return false;
        };
        let current = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
            .unwrap_or_default();
        if current != expected {
            return false;
        }
        let range = value.range();
        let quoted = format!(
            "\"{}\"",
            html_escape::encode_double_quoted_attribute(replacement)
        );
        self.markup.replace_range(range, &quoted);
        true
    }
}

/// Tally of one rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    /// Round trips that failed or timed out; the anchor keeps its target.
    pub preserved: usize,
    /// `mailto:`, fragments and other targets never sent for rewriting.
    pub skipped: usize,
}

/// Rewrite every trackable anchor in `body` through `relay`, one independent
/// round trip per link.
pub async fn rewrite_links(
    body: &Mutex<TrackedBody>,
    relay: &dyn TrackingRelay,
    email_id: &str,
) -> RewriteReport {
    let links = body
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .links();

    let mut report = RewriteReport::default();
    let mut in_flight = FuturesUnordered::new();
    for link in links {
        if !is_trackable(&link.href) {
            report.skipped += 1;
            continue;
        }
        in_flight.push(async move {
            let rewritten = relay.rewrite_link(email_id, &link.href).await;
            (link, rewritten)
        });
    }

    while let Some((link, rewritten)) = in_flight.next().await {
        let Some(rewritten) = rewritten else {
            debug!("keeping original link {}", link.href);
            report.preserved += 1;
            continue;
        };
        let applied = body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_link(link.index, &link.href, &rewritten);
        if applied {
            report.rewritten += 1;
        } else {
            warn!("anchor {} changed before rewrite landed", link.index);
            report.preserved += 1;
        }
    }
    report
}
