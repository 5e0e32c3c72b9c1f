//! Scene host seam and synthetic input.
//!
//! Automation commands observe and drive the live scene graph through this
//! trait. Nodes are addressed by opaque [`NodeId`] handles; the host maps
//! them to its real tree. Input injection hands the host fully formed
//! [`InjectedInput`] events stamped with the synthetic device id, so
//! scripted input is distinguishable from a player's.

use glam::{Vec2, Vec3};

use crate::value::Value;

/// Device id stamped on synthetic input events.
pub const SYNTHETIC_DEVICE_ID: i32 = -1;

/// Opaque handle to a node in the host's scene tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Spatial description of a node, by node family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeSpatial {
    Node2D {
        position: Vec2,
        rotation: f32,
        scale: Vec2,
        visible: bool,
    },
    Node3D {
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
        visible: bool,
    },
    Control {
        position: Vec2,
        size: Vec2,
        visible: bool,
    },
}

/// Identity and placement of one node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    /// Absolute path from the root, `/`-separated.
    pub path: String,
    pub class: String,
    pub spatial: Option<NodeSpatial>,
}

/// Mouse pointer mode as the host display layer understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMode {
    Visible,
    Hidden,
    Captured,
    Confined,
}

/// A synthetic input event fed to the host's input subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedInput {
    MouseButton {
        device: i32,
        position: Vec2,
        button: i32,
        pressed: bool,
        double_click: bool,
    },
    MouseMotion {
        device: i32,
        position: Vec2,
        relative: Vec2,
        button_mask: u32,
    },
    Key {
        device: i32,
        keycode: i64,
        /// Interpret `keycode` as a physical scancode instead of a keysym.
        physical: bool,
        pressed: bool,
    },
    ScreenTouch {
        device: i32,
        index: i32,
        position: Vec2,
        pressed: bool,
    },
}

/// Host scene graph, input and display surface as seen by the agent.
pub trait SceneHost: Send + Sync {
    fn root(&self) -> Option<NodeId>;
    fn find(&self, path: &str) -> Option<NodeId>;
    fn node_info(&self, node: NodeId) -> Option<NodeInfo>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn get_property(&self, node: NodeId, property: &str) -> Option<Value>;
    fn set_property(&self, node: NodeId, property: &str, value: &Value) -> bool;
    fn has_method(&self, node: NodeId, method: &str) -> bool;
    fn call_method(&self, node: NodeId, method: &str, args: &[Value]) -> Option<Value>;

    /// PNG-encode the viewport owning `node`, or the root viewport when
    /// `None`. Returns `None` when no pixels are available.
    fn screenshot(&self, node: Option<NodeId>) -> Option<Vec<u8>>;

    fn current_scene(&self) -> Option<String>;
    fn change_scene(&self, path: &str) -> bool;
    fn reload_scene(&self) -> bool;
    fn set_pause(&self, paused: bool);
    fn set_time_scale(&self, scale: f64);

    fn feed_input(&self, event: InjectedInput);
    fn action_press(&self, action: &str, strength: f32);
    fn action_release(&self, action: &str);
    /// Currently held mouse buttons, for synthesized motion events.
    fn mouse_button_mask(&self) -> u32;

    fn mouse_mode(&self) -> MouseMode;
    fn set_mouse_mode(&self, mode: MouseMode);

    /// Pump and drop pending OS events so the process stays responsive
    /// while the main thread is parked in a break.
    fn process_and_drop_events(&self);
}

pub(crate) fn vec2_value(v: Vec2) -> Value {
    Value::Array(vec![Value::Float(v.x as f64), Value::Float(v.y as f64)])
}

pub(crate) fn vec3_value(v: Vec3) -> Value {
    Value::Array(vec![
        Value::Float(v.x as f64),
        Value::Float(v.y as f64),
        Value::Float(v.z as f64),
    ])
}
