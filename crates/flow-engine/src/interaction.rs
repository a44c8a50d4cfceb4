//! Pointer interaction state machine
//!
//! The canvas is in exactly one [`EditMode`] at a time. Pointer events move
//! it between modes through [`InteractionMachine::handle`], and completed
//! gestures come out as [`Intent`]s for the workspace to apply. The machine
//! never touches the graph itself; the caller supplies hit-test results.

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, Position, Rect};

/// Current gesture on the canvas
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditMode {
    #[default]
    Idle,
    /// A palette item is armed; the next press places it
    Adding {
        component_type: String,
        config: serde_json::Value,
    },
    /// Wiring from `source`; the next press on a node completes the edge
    Connecting { source: NodeId, signal: String },
    /// Dragging nodes; applied as one move on release
    Moving {
        nodes: Vec<NodeId>,
        origin: Position,
        last: Position,
    },
    /// Rubber-band selection
    Selecting { origin: Position, current: Position },
    /// Clipboard contents armed; the next press pastes them
    Pasting,
}

/// Raw pointer input in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed(Position),
    Dragged(Position),
    Released(Position),
    /// Escape or focus loss
    Cancelled,
}

/// A completed gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Intent {
    #[serde(rename_all = "camelCase")]
    AddComponent {
        component_type: String,
        config: serde_json::Value,
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    Connect {
        source: NodeId,
        signal: String,
        target: NodeId,
    },
    #[serde(rename_all = "camelCase")]
    MoveNodes { nodes: Vec<NodeId>, dx: f64, dy: f64 },
    /// Replace the selection; a zero-sized region is a point click
    Select { region: Rect },
    Paste { position: Position },
}

/// Holds the edit mode of one workspace
#[derive(Debug, Clone, Default)]
pub struct InteractionMachine {
    mode: EditMode,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.mode == EditMode::Idle
    }

    /// Arm a palette item for placement
    pub fn begin_adding(&mut self, component_type: impl Into<String>, config: serde_json::Value) {
        self.mode = EditMode::Adding {
            component_type: component_type.into(),
            config,
        };
    }

    /// Start wiring `signal` out of `source`
    pub fn begin_connecting(&mut self, source: impl Into<NodeId>, signal: impl Into<String>) {
        self.mode = EditMode::Connecting {
            source: source.into(),
            signal: signal.into(),
        };
    }

    pub fn begin_pasting(&mut self) {
        self.mode = EditMode::Pasting;
    }

    pub fn reset(&mut self) {
        self.mode = EditMode::Idle;
    }

    /// Feed one pointer event
    ///
    /// `hit` is the node under the pointer, `selection` the current
    /// selection. Pairs not listed in the table leave the mode unchanged.
    pub fn handle(&mut self, event: PointerEvent, hit: Option<&str>, selection: &[NodeId]) -> Option<Intent> {
        use EditMode as M;
        use PointerEvent as E;

        let mode = std::mem::take(&mut self.mode);
        let (next, intent) = match (mode, event) {
            (_, E::Cancelled) => (M::Idle, None),

            (M::Idle, E::Pressed(p)) => match hit {
                Some(id) => {
                    let nodes = if selection.iter().any(|s| s == id) {
                        selection.to_vec()
                    } else {
                        vec![id.to_string()]
                    };
                    (
                        M::Moving {
                            nodes,
                            origin: p,
                            last: p,
                        },
                        None,
                    )
                }
                None => (M::Selecting { origin: p, current: p }, None),
            },

            (M::Adding { component_type, config }, E::Pressed(p)) => (
                M::Idle,
                Some(Intent::AddComponent {
                    component_type,
                    config,
                    position: p,
                }),
            ),

            (M::Connecting { source, signal }, E::Pressed(_)) => match hit {
                Some(target) if target != source => (
                    M::Idle,
                    Some(Intent::Connect {
                        source,
                        signal,
                        target: target.to_string(),
                    }),
                ),
                _ => (M::Idle, None),
            },

            (M::Moving { nodes, origin, .. }, E::Dragged(p)) => (M::Moving { nodes, origin, last: p }, None),
            (M::Moving { nodes, origin, .. }, E::Released(p)) => {
                let (dx, dy) = (p.0 - origin.0, p.1 - origin.1);
                let intent = if dx == 0.0 && dy == 0.0 {
                    Intent::Select {
                        region: Rect::from_corners(p, p),
                    }
                } else {
                    Intent::MoveNodes { nodes, dx, dy }
                };
                (M::Idle, Some(intent))
            }

            (M::Selecting { origin, .. }, E::Dragged(p)) => (M::Selecting { origin, current: p }, None),
            (M::Selecting { origin, .. }, E::Released(p)) => (
                M::Idle,
                Some(Intent::Select {
                    region: Rect::from_corners(origin, p),
                }),
            ),

            (M::Pasting, E::Pressed(p)) => (M::Idle, Some(Intent::Paste { position: p })),

            (mode, _) => (mode, None),
        };
        self.mode = next;
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_moves_whole_selection() {
        let mut machine = InteractionMachine::new();
        let selection = vec!["a".to_string(), "b".to_string()];
        assert_eq!(machine.handle(PointerEvent::Pressed((10.0, 10.0)), Some("a"), &selection), None);
        assert_eq!(machine.handle(PointerEvent::Dragged((15.0, 12.0)), None, &selection), None);
        let intent = machine.handle(PointerEvent::Released((30.0, 5.0)), None, &selection);
        assert_eq!(
            intent,
            Some(Intent::MoveNodes {
                nodes: selection.clone(),
                dx: 20.0,
                dy: -5.0
            })
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn test_press_on_unselected_node_moves_only_it() {
        let mut machine = InteractionMachine::new();
        machine.handle(PointerEvent::Pressed((0.0, 0.0)), Some("c"), &["a".to_string()]);
        let EditMode::Moving { nodes, .. } = machine.mode() else {
            panic!("expected moving");
        };
        assert_eq!(nodes, &vec!["c".to_string()]);
    }

    #[test]
    fn test_click_without_drag_selects_point() {
        let mut machine = InteractionMachine::new();
        machine.handle(PointerEvent::Pressed((5.0, 5.0)), Some("a"), &[]);
        let intent = machine.handle(PointerEvent::Released((5.0, 5.0)), Some("a"), &[]);
        assert_eq!(
            intent,
            Some(Intent::Select {
                region: Rect::new(5.0, 5.0, 0.0, 0.0)
            })
        );
    }

    #[test]
    fn test_rubber_band_select() {
        let mut machine = InteractionMachine::new();
        machine.handle(PointerEvent::Pressed((50.0, 50.0)), None, &[]);
        machine.handle(PointerEvent::Dragged((20.0, 80.0)), None, &[]);
        let intent = machine.handle(PointerEvent::Released((0.0, 100.0)), None, &[]);
        assert_eq!(
            intent,
            Some(Intent::Select {
                region: Rect::new(0.0, 50.0, 50.0, 50.0)
            })
        );
    }

    #[test]
    fn test_connect_requires_other_node() {
        let mut machine = InteractionMachine::new();
        machine.begin_connecting("src", "dataSet");
        assert_eq!(machine.handle(PointerEvent::Pressed((0.0, 0.0)), Some("src"), &[]), None);
        assert!(machine.is_idle());

        machine.begin_connecting("src", "dataSet");
        let intent = machine.handle(PointerEvent::Pressed((0.0, 0.0)), Some("sink"), &[]);
        assert_eq!(
            intent,
            Some(Intent::Connect {
                source: "src".into(),
                signal: "dataSet".into(),
                target: "sink".into()
            })
        );
    }

    #[test]
    fn test_adding_and_pasting_place_at_press() {
        let mut machine = InteractionMachine::new();
        machine.begin_adding("record-source", serde_json::json!({}));
        let intent = machine.handle(PointerEvent::Pressed((3.0, 4.0)), None, &[]);
        assert!(matches!(intent, Some(Intent::AddComponent { position: (3.0, 4.0), .. })));

        machine.begin_pasting();
        assert_eq!(
            machine.handle(PointerEvent::Pressed((7.0, 8.0)), Some("a"), &[]),
            Some(Intent::Paste { position: (7.0, 8.0) })
        );
    }

    #[test]
    fn test_cancel_and_unrelated_events() {
        let mut machine = InteractionMachine::new();
        machine.begin_pasting();
        assert_eq!(machine.handle(PointerEvent::Dragged((1.0, 1.0)), None, &[]), None);
        assert_eq!(machine.mode(), &EditMode::Pasting);
        assert_eq!(machine.handle(PointerEvent::Cancelled, None, &[]), None);
        assert!(machine.is_idle());

        // Release while idle is ignored
        assert_eq!(machine.handle(PointerEvent::Released((1.0, 1.0)), None, &[]), None);
        assert!(machine.is_idle());
    }
}
