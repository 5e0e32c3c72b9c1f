//! Built-in `automation` capture: scene introspection, input injection and
//! scene control for external automation drivers.
//!
//! Every command answers on its own reply verb so a driver can pair
//! requests with acknowledgements without a correlation id.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use glam::Vec2;

use super::capture::{CaptureHandler, CaptureOutcome};
use super::RemoteProbe;
use crate::error::ProbeError;
use crate::scene::{
    vec2_value, vec3_value, InjectedInput, NodeId, NodeSpatial, SceneHost, SYNTHETIC_DEVICE_ID,
};
use crate::value::Value;

/// Serialization stops below this depth and marks the subtree truncated.
const MAX_SERIALIZE_DEPTH: usize = 64;

pub(crate) struct AutomationCapture {
    probe: Weak<RemoteProbe>,
}

impl AutomationCapture {
    pub(crate) fn new(probe: Weak<RemoteProbe>) -> Self {
        Self { probe }
    }

    fn run(&self, probe: &RemoteProbe, cmd: &str, payload: &[Value]) -> Result<bool, ProbeError> {
        let scene = || -> Result<Arc<dyn SceneHost>, ProbeError> {
            probe.scene.clone().ok_or(ProbeError::SceneUnavailable)
        };

        match cmd {
            "get_tree" => {
                let scene = scene()?;
                let root = scene.root().ok_or(ProbeError::SceneUnavailable)?;
                let tree = serialize_node(scene.as_ref(), root, 0);
                probe.send_message("automation:tree", vec![tree]);
            }
            "get_node" => {
                let scene = scene()?;
                let path = arg_str(cmd, payload, 0)?;
                let node = scene
                    .find(path)
                    .map(|node| serialize_node(scene.as_ref(), node, 0))
                    .unwrap_or(Value::Nil);
                probe.send_message("automation:node", vec![node]);
            }
            "get_property" => {
                let scene = scene()?;
                let path = arg_str(cmd, payload, 0)?;
                let property = arg_str(cmd, payload, 1)?;
                let value = scene
                    .find(path)
                    .and_then(|node| scene.get_property(node, property))
                    .unwrap_or(Value::Nil);
                probe.send_message(
                    "automation:property",
                    vec![Value::Str(path.to_string()), Value::Str(property.to_string()), value],
                );
            }
            "set_property" => {
                let scene = scene()?;
                let path = arg_str(cmd, payload, 0)?;
                let property = arg_str(cmd, payload, 1)?;
                let value = payload
                    .get(2)
                    .ok_or_else(|| ProbeError::invalid(cmd, "missing value"))?;
                let success = scene
                    .find(path)
                    .map(|node| scene.set_property(node, property, value))
                    .unwrap_or(false);
                probe.send_message("automation:set_result", vec![Value::Bool(success)]);
            }
            "call_method" => {
                let scene = scene()?;
                let path = arg_str(cmd, payload, 0)?;
                let method = arg_str(cmd, payload, 1)?;
                let args = match payload.get(2) {
                    Some(Value::Array(args)) => args.as_slice(),
                    _ => &[],
                };
                let result = scene
                    .find(path)
                    .filter(|node| scene.has_method(*node, method))
                    .and_then(|node| scene.call_method(node, method, args))
                    .unwrap_or(Value::Nil);
                probe.send_message(
                    "automation:call_result",
                    vec![Value::Str(path.to_string()), Value::Str(method.to_string()), result],
                );
            }
            "mouse_button" => {
                let scene = scene()?;
                let position = Vec2::new(arg_f32(cmd, payload, 0)?, arg_f32(cmd, payload, 1)?);
                let button = arg_int(cmd, payload, 2)? as i32;
                let pressed = arg_bool(cmd, payload, 3)?;
                let double_click = payload.get(4).and_then(Value::as_bool).unwrap_or(false);
                scene.feed_input(InjectedInput::MouseButton {
                    device: SYNTHETIC_DEVICE_ID,
                    position,
                    button,
                    pressed,
                    double_click,
                });
                probe.send_message("automation:input_result", vec![Value::Bool(true)]);
            }
            "mouse_motion" => {
                let scene = scene()?;
                let position = Vec2::new(arg_f32(cmd, payload, 0)?, arg_f32(cmd, payload, 1)?);
                let relative = Vec2::new(arg_f32(cmd, payload, 2)?, arg_f32(cmd, payload, 3)?);
                let button_mask = scene.mouse_button_mask();
                scene.feed_input(InjectedInput::MouseMotion {
                    device: SYNTHETIC_DEVICE_ID,
                    position,
                    relative,
                    button_mask,
                });
                probe.send_message("automation:input_result", vec![Value::Bool(true)]);
            }
            "key" => {
                let scene = scene()?;
                let keycode = arg_int(cmd, payload, 0)?;
                let pressed = arg_bool(cmd, payload, 1)?;
                let physical = payload.get(2).and_then(Value::as_bool).unwrap_or(false);
                scene.feed_input(InjectedInput::Key {
                    device: SYNTHETIC_DEVICE_ID,
                    keycode,
                    physical,
                    pressed,
                });
                probe.send_message("automation:input_result", vec![Value::Bool(true)]);
            }
            "touch" => {
                let scene = scene()?;
                let index = arg_int(cmd, payload, 0)? as i32;
                let position = Vec2::new(arg_f32(cmd, payload, 1)?, arg_f32(cmd, payload, 2)?);
                let pressed = arg_bool(cmd, payload, 3)?;
                scene.feed_input(InjectedInput::ScreenTouch {
                    device: SYNTHETIC_DEVICE_ID,
                    index,
                    position,
                    pressed,
                });
                probe.send_message("automation:input_result", vec![Value::Bool(true)]);
            }
            "action" => {
                let scene = scene()?;
                let action = arg_str(cmd, payload, 0)?;
                let pressed = arg_bool(cmd, payload, 1)?;
                if pressed {
                    let strength = payload
                        .get(2)
                        .and_then(Value::as_float)
                        .unwrap_or(1.0) as f32;
                    scene.action_press(action, strength);
                } else {
                    scene.action_release(action);
                }
                probe.send_message("automation:input_result", vec![Value::Bool(true)]);
            }
            "screenshot" => {
                let scene = scene()?;
                let node = match payload.first().and_then(Value::as_str) {
                    Some(path) if !path.is_empty() => scene.find(path),
                    _ => None,
                };
                let png = scene.screenshot(node).unwrap_or_default();
                probe.send_message("automation:screenshot", vec![Value::Bytes(png)]);
            }
            "query_nodes" => {
                let scene = scene()?;
                let pattern = arg_str(cmd, payload, 0)?;
                let results = query_nodes(scene.as_ref(), pattern);
                probe.send_message("automation:query_result", vec![Value::Array(results)]);
            }
            "count_nodes" => {
                let scene = scene()?;
                let pattern = arg_str(cmd, payload, 0)?;
                let count = query_nodes(scene.as_ref(), pattern).len();
                probe.send_message("automation:count_result", vec![Value::Int(count as i64)]);
            }
            "get_current_scene" => {
                let scene = scene()?;
                let current = scene.current_scene().unwrap_or_default();
                probe.send_message("automation:current_scene", vec![Value::Str(current)]);
            }
            "change_scene" => {
                let scene = scene()?;
                let path = arg_str(cmd, payload, 0)?;
                let success = scene.change_scene(path);
                probe.send_message("automation:scene_result", vec![Value::Bool(success)]);
            }
            "reload_scene" => {
                let scene = scene()?;
                let success = scene.reload_scene();
                probe.send_message("automation:scene_result", vec![Value::Bool(success)]);
            }
            "pause" => {
                let scene = scene()?;
                let paused = arg_bool(cmd, payload, 0)?;
                scene.set_pause(paused);
                probe.send_message("automation:pause_result", vec![Value::Bool(true)]);
            }
            "time_scale" => {
                let scene = scene()?;
                let scale = payload
                    .first()
                    .and_then(Value::as_float)
                    .ok_or_else(|| ProbeError::invalid(cmd, "expected [float]"))?;
                scene.set_time_scale(scale);
                probe.send_message("automation:time_scale_result", vec![Value::Bool(true)]);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl CaptureHandler for AutomationCapture {
    fn capture(&self, cmd: &str, payload: &[Value]) -> CaptureOutcome {
        let Some(probe) = self.probe.upgrade() else {
            return CaptureOutcome::Unrecognized;
        };
        match self.run(&probe, cmd, payload) {
            Ok(true) => CaptureOutcome::Captured,
            Ok(false) => CaptureOutcome::Unrecognized,
            Err(err) => CaptureOutcome::Invalid(err),
        }
    }
}

fn arg_str<'a>(cmd: &str, payload: &'a [Value], index: usize) -> Result<&'a str, ProbeError> {
    payload
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ProbeError::invalid(cmd, format!("argument {index} must be a string")))
}

fn arg_int(cmd: &str, payload: &[Value], index: usize) -> Result<i64, ProbeError> {
    payload
        .get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| ProbeError::invalid(cmd, format!("argument {index} must be an integer")))
}

fn arg_f32(cmd: &str, payload: &[Value], index: usize) -> Result<f32, ProbeError> {
    payload
        .get(index)
        .and_then(Value::as_float)
        .map(|f| f as f32)
        .ok_or_else(|| ProbeError::invalid(cmd, format!("argument {index} must be a number")))
}

fn arg_bool(cmd: &str, payload: &[Value], index: usize) -> Result<bool, ProbeError> {
    payload
        .get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| ProbeError::invalid(cmd, format!("argument {index} must be a bool")))
}

/// Serialize one node and its children to the tool-facing dictionary.
fn serialize_node(scene: &dyn SceneHost, node: NodeId, depth: usize) -> Value {
    let mut dict = BTreeMap::new();
    let Some(info) = scene.node_info(node) else {
        return Value::Dict(dict);
    };
    dict.insert("name".to_string(), Value::Str(info.name));
    dict.insert("path".to_string(), Value::Str(info.path));
    dict.insert("class".to_string(), Value::Str(info.class));

    match info.spatial {
        Some(NodeSpatial::Node2D {
            position,
            rotation,
            scale,
            visible,
        }) => {
            dict.insert("position".to_string(), vec2_value(position));
            dict.insert("rotation".to_string(), Value::Float(rotation as f64));
            dict.insert("scale".to_string(), vec2_value(scale));
            dict.insert("visible".to_string(), Value::Bool(visible));
        }
        Some(NodeSpatial::Node3D {
            position,
            rotation,
            scale,
            visible,
        }) => {
            dict.insert("position".to_string(), vec3_value(position));
            dict.insert("rotation".to_string(), vec3_value(rotation));
            dict.insert("scale".to_string(), vec3_value(scale));
            dict.insert("visible".to_string(), Value::Bool(visible));
        }
        Some(NodeSpatial::Control {
            position,
            size,
            visible,
        }) => {
            dict.insert("position".to_string(), vec2_value(position));
            dict.insert("size".to_string(), vec2_value(size));
            dict.insert("visible".to_string(), Value::Bool(visible));
        }
        None => {}
    }

    if depth >= MAX_SERIALIZE_DEPTH {
        dict.insert("truncated".to_string(), Value::Bool(true));
    } else {
        let children: Vec<Value> = scene
            .children(node)
            .into_iter()
            .map(|child| serialize_node(scene, child, depth + 1))
            .collect();
        dict.insert("children".to_string(), Value::Array(children));
    }

    Value::Dict(dict)
}

/// Depth-first pattern search over the whole tree.
fn query_nodes(scene: &dyn SceneHost, pattern: &str) -> Vec<Value> {
    let mut results = Vec::new();
    if let Some(root) = scene.root() {
        query_recursive(scene, root, pattern, &mut results);
    }
    results
}

fn query_recursive(scene: &dyn SceneHost, node: NodeId, pattern: &str, results: &mut Vec<Value>) {
    if let Some(info) = scene.node_info(node) {
        if pattern_matches(pattern, &info.name, &info.class) {
            results.push(serialize_node(scene, node, 0));
        }
    }
    for child in scene.children(node) {
        query_recursive(scene, child, pattern, results);
    }
}

/// Match a node by name or class. A leading `*` means suffix match, a
/// trailing `*` prefix match, both mean substring; otherwise exact.
fn pattern_matches(pattern: &str, name: &str, class: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let starts = pattern.starts_with('*');
    let ends = pattern.ends_with('*');
    if starts && ends {
        let inner = &pattern[1..pattern.len() - 1];
        name.contains(inner) || class.contains(inner)
    } else if starts {
        let suffix = &pattern[1..];
        name.ends_with(suffix) || class.ends_with(suffix)
    } else if ends {
        let prefix = &pattern[..pattern.len() - 1];
        name.starts_with(prefix) || class.starts_with(prefix)
    } else {
        name == pattern || class == pattern
    }
}
