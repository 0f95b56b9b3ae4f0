//! Send-control scorer.
//!
//! A compose surface contains dozens of button-shaped controls (formatting,
//! attachments, emoji, discard, more-options). The real send control is picked
//! by an additive score over attribute, text, icon and position signals, with
//! a structural fallback when nothing scores positive.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::extract::find_body_node;
use super::snapshot::{DomNode, NodeId};

/// Locale-aware "send" vocabulary, matched as case-insensitive substrings.
pub const SEND_VOCABULARY: &[&str] = &[
    "send",
    "enviar",
    "envoyer",
    "invia",
    "senden",
    "verzenden",
    "wyślij",
    "отправить",
    "送信",
    "发送",
];

pub const WEIGHT_TOOLTIP: i32 = 10;
pub const WEIGHT_ARIA: i32 = 8;
pub const WEIGHT_SHORTCUT: i32 = 6;
pub const WEIGHT_FOOTER: i32 = 6;
pub const WEIGHT_ICON: i32 = 4;
pub const WEIGHT_PLANE_ICON: i32 = 2;
pub const WEIGHT_FIRST_LAST: i32 = 3;
pub const PENALTY_ARCHIVE: i32 = -8;
pub const PENALTY_FORMATTING: i32 = -6;
pub const PENALTY_ATTACHMENT: i32 = -5;
pub const PENALTY_EMOJI: i32 = -4;

/// Layout slack when comparing a candidate's top edge with the body's bottom.
const LAYOUT_TOLERANCE_PX: f64 = 4.0;

static SHORTCUT_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ctrl\s*[+-]\s*enter|⌘\s*enter|cmd\s*\+\s*enter")
        .expect("Failed to compile shortcut hint regex")
});

static ARCHIVE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)archive|remove|trash|delete|discard")
        .expect("Failed to compile archive regex")
});

static FORMATTING_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)format|fonts|bold|italic|underline|text colou?r")
        .expect("Failed to compile formatting regex")
});

static ATTACHMENT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)attach|paperclip|insert files|drive")
        .expect("Failed to compile attachment regex")
});

static EMOJI_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)emoji|smile").expect("Failed to compile emoji regex")
});

/// Case-insensitive substring match against [`SEND_VOCABULARY`].
pub fn matches_send_text(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    SEND_VOCABULARY.iter().any(|word| lower.contains(word))
}

/// Which signals fired for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub tooltip: bool,
    pub aria: bool,
    pub shortcut_hint: bool,
    pub footer: bool,
    pub icon: bool,
    pub plane_icon: bool,
    pub first_or_last: bool,
    pub archive: bool,
    pub formatting: bool,
    pub attachment: bool,
    pub emoji: bool,
}

impl ScoreBreakdown {
    pub fn score(&self) -> i32 {
        [
            (self.tooltip, WEIGHT_TOOLTIP),
            (self.aria, WEIGHT_ARIA),
            (self.shortcut_hint, WEIGHT_SHORTCUT),
            (self.footer, WEIGHT_FOOTER),
            (self.icon, WEIGHT_ICON),
            (self.plane_icon, WEIGHT_PLANE_ICON),
            (self.first_or_last, WEIGHT_FIRST_LAST),
            (self.archive, PENALTY_ARCHIVE),
            (self.formatting, PENALTY_FORMATTING),
            (self.attachment, PENALTY_ATTACHMENT),
            (self.emoji, PENALTY_EMOJI),
        ]
        .iter()
        .filter(|(fired, _)| *fired)
        .map(|(_, weight)| weight)
        .sum()
    }
}

/// How the chosen control was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceReason {
    Scored,
    ToolbarFallback,
    LastActionable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendButtonChoice {
    pub node: NodeId,
    pub score: i32,
    pub reason: ChoiceReason,
}

fn is_toolbar_region(node: &DomNode) -> bool {
    node.role() == Some("toolbar")
        || node
            .aria_label()
            .is_some_and(|l| l.contains("More") || l.contains("Actions"))
}

/// Nearest toolbar-like ancestor of `candidate` inside `surface`.
fn enclosing_toolbar<'a>(surface: &'a DomNode, candidate: &DomNode) -> Option<&'a DomNode> {
    let path = surface.path_to(candidate.id)?;
    // exclude the candidate itself
    path[..path.len() - 1]
        .iter()
        .rev()
        .find(|n| is_toolbar_region(n))
        .copied()
}

fn is_after_body(surface: &DomNode, candidate: &DomNode, body: Option<&DomNode>) -> bool {
    let Some(body) = body else {
        return false;
    };
    match (candidate.rect, body.rect) {
        (Some(c), Some(b)) => c.top >= b.bottom() - LAYOUT_TOLERANCE_PX,
        // no layout information: fall back to document order
        _ => match (
            surface.document_position(body.id),
            surface.document_position(candidate.id),
        ) {
            (Some(b), Some(c)) => c > b && !body.contains(candidate.id),
            _ => false,
        },
    }
}

fn has_plane_glyph(svg: &DomNode) -> bool {
    svg.iter().any(|n| {
        n.inner_html
            .as_deref()
            .is_some_and(|h| h.to_ascii_lowercase().contains("plane"))
            || n.attrs
                .values()
                .any(|v| v.to_ascii_lowercase().contains("plane"))
    })
}

fn is_first_or_last_in(toolbar: &DomNode, candidate: &DomNode) -> bool {
    let actionable = toolbar.find_all(DomNode::is_actionable);
    match (actionable.first(), actionable.last()) {
        (Some(first), Some(last)) => first.id == candidate.id || last.id == candidate.id,
        _ => false,
    }
}

/// Score one candidate against its surface.
pub fn score_candidate(surface: &DomNode, candidate: &DomNode) -> ScoreBreakdown {
    let tooltip = candidate.attr("data-tooltip").unwrap_or_default();
    let aria = candidate.aria_label().unwrap_or_default();
    let text = candidate.text_content();
    let combined = format!("{} {} {}", text, tooltip, aria);
    let body = find_body_node(surface);
    let toolbar = enclosing_toolbar(surface, candidate);
    let svg = candidate.find(|n| n.tag == "svg");

    ScoreBreakdown {
        tooltip: matches_send_text(tooltip),
        aria: matches_send_text(aria),
        shortcut_hint: SHORTCUT_HINT.is_match(&combined),
        footer: toolbar.is_some() || is_after_body(surface, candidate, body),
        icon: svg.is_some(),
        plane_icon: svg.is_some_and(has_plane_glyph),
        first_or_last: toolbar.is_some_and(|t| is_first_or_last_in(t, candidate)),
        archive: ARCHIVE_TEXT.is_match(&combined),
        formatting: FORMATTING_TEXT.is_match(&combined),
        attachment: ATTACHMENT_TEXT.is_match(&combined),
        emoji: EMOJI_TEXT.is_match(&combined),
    }
}

/// Pick the send control for a registered surface.
///
/// Highest score wins, earliest in document order on ties. When the best
/// score is non-positive the first actionable control of the first toolbar
/// region is used, then the last actionable control anywhere in the surface.
pub fn choose_send_button(surface: &DomNode) -> Option<SendButtonChoice> {
    let mut best: Option<(&DomNode, i32)> = None;
    for candidate in surface.descendants().filter(|n| n.is_button_like()) {
        let breakdown = score_candidate(surface, candidate);
        let score = breakdown.score();
        debug!(
            "send candidate node={} score={} breakdown={:?}",
            candidate.id, score, breakdown
        );
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    if let Some((node, score)) = best
        && score > 0
    {
        return Some(SendButtonChoice {
            node: node.id,
            score,
            reason: ChoiceReason::Scored,
        });
    }

    let toolbar_first = surface
        .find(is_toolbar_region)
        .and_then(|t| t.find(DomNode::is_actionable));
    if let Some(node) = toolbar_first {
        return Some(SendButtonChoice {
            node: node.id,
            score: best.map_or(0, |(_, s)| s),
            reason: ChoiceReason::ToolbarFallback,
        });
    }

    surface
        .find_all(DomNode::is_actionable)
        .last()
        .map(|node| SendButtonChoice {
            node: node.id,
            score: best.map_or(0, |(_, s)| s),
            reason: ChoiceReason::LastActionable,
        })
}
