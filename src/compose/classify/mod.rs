//! Compose-surface classification.
//!
//! The host keeps class names unstable, so matching is done on roles and
//! ARIA labels only:
//! - `role="dialog"` hosts pop-out compose windows
//! - `aria-label="New Message"` covers inline compose panels
//! - `aria-label` starting with "Reply" (or containing "Reply all") covers inline replies
//!
//! Every kind must also contain a subject field or an editable body, which
//! filters out the many unrelated dialogs the host opens.

use super::snapshot::DomNode;

/// `input[name="subjectbox"]`, or an input whose label mentions the subject.
pub fn is_subject_input(node: &DomNode) -> bool {
    node.tag == "input"
        && (node.attr("name") == Some("subjectbox")
            || node
                .aria_label()
                .is_some_and(|l| l.to_ascii_lowercase().contains("subject")))
}

/// The explicitly labeled message-body region.
pub fn is_message_body(node: &DomNode) -> bool {
    node.aria_label() == Some("Message Body")
}

/// Any editable region that could hold the body.
pub fn is_editable_region(node: &DomNode) -> bool {
    node.is_contenteditable()
}

fn has_compose_fields(node: &DomNode) -> bool {
    node.find(|n| is_subject_input(n) || is_message_body(n) || is_editable_region(n))
        .is_some()
}

fn is_reply_panel(label: &str) -> bool {
    label.starts_with("Reply") || label.contains("Reply all")
}

/// Whether `node` itself looks like a compose surface.
pub fn is_compose_surface(node: &DomNode) -> bool {
    let shaped = node.role() == Some("dialog")
        || node
            .aria_label()
            .is_some_and(|l| l == "New Message" || is_reply_panel(l));
    shaped && has_compose_fields(node)
}

/// All compose surfaces under `root`, in document order.
///
/// Nested matches (an inline panel inside a matching dialog) collapse into the
/// outermost one, so each physical compose window yields one candidate.
pub fn find_compose_surfaces(root: &DomNode) -> Vec<&DomNode> {
    let mut found = Vec::new();
    collect(root, &mut found);
    found
}

fn collect<'a>(node: &'a DomNode, out: &mut Vec<&'a DomNode>) {
    if is_compose_surface(node) {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect(child, out);
    }
}
