//! Structural snapshot of the host document.
//!
//! The host UI's live tree is never handled directly. Each document-change
//! batch is delivered as an owned snapshot carrying the attributes, text,
//! form values, editable markup and layout boxes the heuristics need. Node ids
//! are stable across snapshots for the lifetime of the underlying node, so a
//! session can refer to "its" root or body by id and discover staleness by a
//! failed lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identity of a node across snapshots.
pub type NodeId = u64;

/// Rendered box in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub id: NodeId,
    /// Lower-case tag name.
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Text directly owned by this node (not including children).
    #[serde(default)]
    pub text: String,
    /// Current value of a form control.
    #[serde(default)]
    pub value: Option<String>,
    /// Serialized inner markup; only populated for editable regions.
    #[serde(default)]
    pub inner_html: Option<String>,
    /// `None` when the node has no layout box.
    #[serde(default)]
    pub rect: Option<Rect>,
    /// `display: none` or detached from the rendering tree.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn new(id: NodeId, tag: &str) -> Self {
        Self {
            id,
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn with_html(mut self, html: &str) -> Self {
        self.inner_html = Some(html.to_string());
        self
    }

    #[must_use]
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn child(mut self, node: DomNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    pub fn aria_label(&self) -> Option<&str> {
        self.attr("aria-label")
    }

    pub fn is_contenteditable(&self) -> bool {
        self.attr("contenteditable")
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }

    pub fn is_button_like(&self) -> bool {
        self.tag == "button" || self.role() == Some("button")
    }

    /// Buttons the user can actually press.
    pub fn is_actionable(&self) -> bool {
        self.is_button_like()
            && !self.hidden
            && self.attr("aria-disabled") != Some("true")
            && !self.has_attr("disabled")
    }

    /// Non-zero rendered size and not hidden.
    pub fn is_visible(&self) -> bool {
        !self.hidden && self.rect.is_some_and(|r| !r.is_empty())
    }

    /// Concatenated text of this node and all descendants, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in self.iter() {
            out.push_str(&node.text);
        }
        out
    }

    /// This node followed by all descendants in document order.
    pub fn iter(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }

    /// All descendants in document order, excluding this node.
    pub fn descendants(&self) -> impl Iterator<Item = &DomNode> {
        self.iter().skip(1)
    }

    /// First descendant matching `pred` (querySelector semantics).
    pub fn find(&self, pred: impl Fn(&DomNode) -> bool) -> Option<&DomNode> {
        self.descendants().find(|n| pred(n))
    }

    pub fn find_all(&self, pred: impl Fn(&DomNode) -> bool) -> Vec<&DomNode> {
        self.descendants().filter(|n| pred(n)).collect()
    }

    /// Node with the given id, including this node.
    pub fn get(&self, id: NodeId) -> Option<&DomNode> {
        self.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Chain from this node down to `id`, both inclusive.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&DomNode>> {
        if self.id == id {
            return Some(vec![self]);
        }
        for child in &self.children {
            if let Some(mut path) = child.path_to(id) {
                path.insert(0, self);
                return Some(path);
            }
        }
        None
    }

    /// Position of `id` in document order below this node.
    pub fn document_position(&self, id: NodeId) -> Option<usize> {
        self.iter().position(|n| n.id == id)
    }
}

/// Pre-order traversal.
pub struct Nodes<'a> {
    stack: Vec<&'a DomNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// One coalesced view of the whole host document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub root: DomNode,
}

impl DocumentSnapshot {
    pub fn new(root: DomNode) -> Self {
        Self { root }
    }

    pub fn get(&self, id: NodeId) -> Option<&DomNode> {
        self.root.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.root.contains(id)
    }
}
