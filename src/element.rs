//! Element identification
//!
//! Derives a structural descriptor for the element an interaction struck,
//! from the event's composed propagation path (innermost target first, as the
//! host observed it). Each node renders as `tag[.class][#id]`; a multi-class
//! attribute stays one literal class-list token.

use serde::{Deserialize, Serialize};

/// Separator between ancestor tokens in a rendered path
const PATH_SEPARATOR: &str = ">";

/// One element node on an interaction's propagation path.
///
/// The host feeds element nodes only; document and window entries never
/// appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Literal class attribute value, possibly several space-separated names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    /// Value of the custom `data-tracker` attribute, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_tracker: Option<String>,
}

/// Structural description of where an interaction occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// Ancestor tokens from the root down to the target's parent
    pub path: String,
    /// The struck element's own token
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_tracker: Option<String>,
}

/// Render a single node as `tag[.class][#id]`.
///
/// Missing or empty id/class omit their token entirely, so a bare `<div>`
/// renders as just `div`.
fn render(node: &DomNode) -> String {
    let mut token = node.tag.to_lowercase();

    if let Some(classes) = node.classes.as_deref() {
        if !classes.is_empty() {
            token.push('.');
            token.push_str(classes);
        }
    }

    if let Some(id) = node.id.as_deref() {
        if !id.is_empty() {
            token.push('#');
            token.push_str(id);
        }
    }

    token
}

/// Derive the descriptor for a propagation path, innermost target first.
///
/// The target is rendered on its own and excluded from `path`, which lists
/// the remaining ancestors in root-to-parent order. An empty propagation
/// path yields `None` rather than an error: a malformed interaction degrades,
/// it never aborts capture.
pub fn identify(path: &[DomNode]) -> Option<ElementDescriptor> {
    let target_node = path.first()?;

    let ancestors: Vec<String> = path.iter().skip(1).rev().map(render).collect();

    Some(ElementDescriptor {
        path: ancestors.join(PATH_SEPARATOR),
        target: render(target_node),
        data_tracker: target_node.data_tracker.clone(),
    })
}
