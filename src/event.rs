//! Interaction events
//!
//! Two shapes live here. `Interaction` is the raw occurrence the host feeds
//! in (a click with its propagation path, a scroll offset, a keystroke in a
//! registered field). `TrackEvent` is what actually enters the queue and goes
//! over the wire: a creation timestamp plus a closed union with one variant
//! per event kind, so dispatch is exhaustive by construction.
//!
//! Raw input text never reaches a `TrackEvent`: values are masked at capture,
//! preserving only their length.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::element::{DomNode, ElementDescriptor};
use crate::types::{ScrollPosition, Viewport};

/// Replace every character of a field value with a placeholder.
///
/// The masked value keeps the original character count so typing-length
/// signal survives, and nothing else does.
pub fn mask_value(raw: &str) -> String {
    "*".repeat(raw.chars().count())
}

/// Pointer coordinates plus the struck element, shared by the click family.
///
/// The descriptor is absent when derivation failed for the interaction; a
/// malformed path must not suppress the click itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerPayload {
    pub x: f64,
    pub y: f64,
    #[serde(flatten)]
    pub element: Option<ElementDescriptor>,
}

/// Masked snapshot of an edited input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputChangePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub field_type: String,
    /// Masked value, one placeholder per original character
    pub value: String,
    #[serde(flatten)]
    pub element: Option<ElementDescriptor>,
}

/// Kind-specific payload of a captured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    ViewportResize {
        viewport: Viewport,
    },
    Scroll {
        position: ScrollPosition,
    },
    Click {
        #[serde(flatten)]
        pointer: PointerPayload,
    },
    DoubleClick {
        #[serde(flatten)]
        pointer: PointerPayload,
    },
    RightClick {
        #[serde(flatten)]
        pointer: PointerPayload,
    },
    InputChange {
        #[serde(flatten)]
        input: InputChangePayload,
    },
}

impl EventPayload {
    /// Wire tag of this payload kind
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::ViewportResize { .. } => "viewport-resize",
            EventPayload::Scroll { .. } => "scroll",
            EventPayload::Click { .. } => "click",
            EventPayload::DoubleClick { .. } => "double-click",
            EventPayload::RightClick { .. } => "right-click",
            EventPayload::InputChange { .. } => "input-change",
        }
    }
}

/// One captured interaction event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl TrackEvent {
    /// Stamp a payload with the current time
    pub fn new(payload: EventPayload) -> Self {
        TrackEvent {
            created_at: Utc::now(),
            payload,
        }
    }
}

/// A text-type input field registered with the batcher at load time.
///
/// Fields appearing later are not observed; that scope limitation is part of
/// the capture contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_field_type")]
    pub field_type: String,
    /// Propagation path captured at registration, innermost first; may be
    /// empty, in which case input events carry no element descriptor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<DomNode>,
}

fn default_field_type() -> String {
    "text".to_string()
}

impl Default for InputField {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            field_type: default_field_type(),
            path: Vec::new(),
        }
    }
}

/// A raw interaction occurrence as observed by the host.
///
/// Click-family occurrences arrive with their full propagation path
/// (innermost target first); input edits arrive with the raw text and the
/// registration index of the field they happened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Interaction {
    ViewportResize { viewport: Viewport },
    Scroll { position: ScrollPosition },
    Click { x: f64, y: f64, path: Vec<DomNode> },
    DoubleClick { x: f64, y: f64, path: Vec<DomNode> },
    RightClick { x: f64, y: f64, path: Vec<DomNode> },
    InputEdit { field_index: usize, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mask_preserves_length_only() {
        assert_eq!(mask_value("hello"), "*****");
        assert_eq!(mask_value(""), "");
        assert_eq!(mask_value("héllo"), "*****");
        // Deterministic: same input, same mask
        assert_eq!(mask_value("hello"), mask_value("hello"));
    }

    #[test]
    fn test_click_event_wire_shape() {
        let event = TrackEvent::new(EventPayload::Click {
            pointer: PointerPayload {
                x: 10.0,
                y: 20.0,
                element: Some(ElementDescriptor {
                    path: "div#app>section.main".to_string(),
                    target: "button.btn#submit".to_string(),
                    data_tracker: None,
                }),
            },
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["x"], 10.0);
        assert_eq!(json["y"], 20.0);
        assert_eq!(json["target"], "button.btn#submit");
        assert_eq!(json["path"], "div#app>section.main");
        assert!(json.get("dataTracker").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_input_change_wire_shape() {
        let event = TrackEvent::new(EventPayload::InputChange {
            input: InputChangePayload {
                field_id: Some("email".to_string()),
                field_name: None,
                field_type: "text".to_string(),
                value: mask_value("me@example.com"),
                element: None,
            },
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input-change");
        assert_eq!(json["fieldId"], "email");
        assert_eq!(json["fieldType"], "text");
        assert_eq!(json["value"], "**************");
        assert!(json.get("fieldName").is_none());
    }

    #[test]
    fn test_event_round_trip() {
        let event = TrackEvent::new(EventPayload::Scroll {
            position: ScrollPosition { x: 0.0, y: 640.0 },
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: TrackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_interaction_kinds_parse() {
        let line = r#"{"kind":"double-click","x":5.0,"y":6.0,"path":[{"tag":"button"}]}"#;
        let interaction: Interaction = serde_json::from_str(line).unwrap();
        assert!(matches!(interaction, Interaction::DoubleClick { .. }));

        let line = r#"{"kind":"input-edit","fieldIndex":0,"value":"abc"}"#;
        let interaction: Interaction = serde_json::from_str(line).unwrap();
        assert_eq!(
            interaction,
            Interaction::InputEdit {
                field_index: 0,
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_payload_kind_tags() {
        let payload = EventPayload::ViewportResize {
            viewport: Viewport {
                width: 800,
                height: 600,
            },
        };
        assert_eq!(payload.kind(), "viewport-resize");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "viewport-resize");
    }
}
