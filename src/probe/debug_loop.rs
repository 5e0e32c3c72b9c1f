//! The synchronous break loop and the idle pump.
//!
//! [`RemoteProbe::debug`] is called by whichever thread the script VM is
//! on when it hits a breakpoint or a caught error. The calling thread
//! parks in a polling pump until the tool sends a resume verb, servicing
//! inspection and evaluation requests while parked.
//! [`RemoteProbe::poll_events`] is the non-breaking counterpart the host
//! runs once per frame.

use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::capture::CaptureOutcome;
use super::{current_thread_id, lock_shared, RemoteProbe};
use crate::marshal::{serialize_stack_dump, StackVariable, VarKind};
use crate::scene::MouseMode;
use crate::value::Value;

/// Pause between pump iterations while no command is waiting.
const PUMP_SLEEP: Duration = Duration::from_millis(10);

impl RemoteProbe {
    /// Park the calling thread in a break until the tool resumes it.
    ///
    /// `can_continue` is forwarded to the tool (false for fatal stops);
    /// `is_error_breakpoint` marks breaks raised by the error path, which
    /// bypass the skip-breakpoints flag but honor ignore-error-breaks.
    pub fn debug(&self, can_continue: bool, is_error_breakpoint: bool) {
        {
            let _shared = lock_shared(self);
            if self.language.is_skipping_breakpoints() && !is_error_breakpoint {
                return;
            }
            if !self.is_peer_connected() {
                error!("Debugger peer is not connected, cannot break");
                return;
            }
            if !self.peer.can_block() {
                return;
            }
        }
        if is_error_breakpoint && self.language.is_ignoring_error_breaks() {
            return;
        }

        let thread = current_thread_id();
        let enter_payload = vec![
            Value::Bool(can_continue),
            Value::Str(self.language.current_error()),
            Value::Bool(self.language.stack_depth() > 0),
            Value::Int(thread.0 as i64),
        ];
        self.invoke_focus_steal();
        self.send_message("debug_enter", enter_payload);

        let is_main = thread == self.main_thread;
        let mut saved_mouse_mode = None;
        if is_main {
            if let Some(scene) = &self.scene {
                let mode = scene.mouse_mode();
                if mode != MouseMode::Visible {
                    scene.set_mouse_mode(MouseMode::Visible);
                    saved_mouse_mode = Some(mode);
                }
            }
        } else {
            self.insert_inbox(thread);
        }

        while self.is_peer_connected() {
            self.flush_output();
            self.poll_messages();

            let Some(cmd) = self.next_message() else {
                thread::sleep(PUMP_SLEEP);
                if is_main {
                    // The busy loop parks the main thread; OS events still
                    // need pumping or the window stops responding.
                    if let Some(scene) = &self.scene {
                        scene.process_and_drop_events();
                    }
                }
                continue;
            };

            match cmd.verb.as_str() {
                "step" => {
                    self.language.set_depth(-1);
                    self.language.set_lines_left(1);
                    break;
                }
                "next" => {
                    self.language.set_depth(0);
                    self.language.set_lines_left(1);
                    break;
                }
                "out" => {
                    self.language.set_depth(1);
                    self.language.set_lines_left(1);
                    break;
                }
                "continue" => {
                    self.language.set_depth(-1);
                    self.language.set_lines_left(-1);
                    break;
                }
                "break" => {
                    warn!("Received a break request while already broken");
                    break;
                }
                "get_stack_dump" => self.send_stack_dump(),
                "get_stack_frame_vars" => self.send_stack_frame_vars(&cmd.payload),
                "reload_scripts" => self.defer_reload_paths(&cmd.payload),
                "reload_all_scripts" => self.defer_reload_all(),
                "breakpoint" => {
                    if cmd.payload.len() < 3 {
                        warn!("breakpoint command needs [line, source, set]");
                        continue;
                    }
                    let (Some(line), Some(source), Some(set)) = (
                        cmd.payload[0].as_int(),
                        cmd.payload[1].as_str(),
                        cmd.payload[2].as_bool(),
                    ) else {
                        warn!("breakpoint command needs [line, source, set]");
                        continue;
                    };
                    if set {
                        self.language.insert_breakpoint(source, line as u32);
                    } else {
                        self.language.remove_breakpoint(source, line as u32);
                    }
                }
                "set_skip_breakpoints" => {
                    let Some(skip) = cmd.payload.first().and_then(Value::as_bool) else {
                        warn!("set_skip_breakpoints command needs [bool]");
                        continue;
                    };
                    self.language.set_skip_breakpoints(skip);
                }
                "set_ignore_error_breaks" => {
                    let Some(ignore) = cmd.payload.first().and_then(Value::as_bool) else {
                        warn!("set_ignore_error_breaks command needs [bool]");
                        continue;
                    };
                    self.language.set_ignore_error_breaks(ignore);
                }
                "evaluate" => self.evaluate_expression(&cmd.payload),
                _ => match self.try_capture(&cmd.verb, &cmd.payload) {
                    CaptureOutcome::Captured => {}
                    CaptureOutcome::Unrecognized => {
                        warn!(verb = %cmd.verb, "Unknown message received from debugger");
                    }
                    CaptureOutcome::Invalid(err) => {
                        // Known command, malformed payload: nothing is echoed
                        // back to the tool.
                        debug!(verb = %cmd.verb, %err, "capture rejected payload");
                    }
                },
            }
        }

        self.send_message("debug_exit", Vec::new());

        if is_main {
            if let (Some(scene), Some(mode)) = (&self.scene, saved_mouse_mode) {
                scene.set_mouse_mode(mode);
            }
        } else {
            self.remove_inbox(thread);
        }
    }

    /// Non-breaking per-frame pump: flush buffers, demux inbound frames
    /// and dispatch everything addressed to this thread through the
    /// captures. Deferred script reloads run only when `is_idle`.
    pub fn poll_events(&self, is_idle: bool) {
        self.flush_output();
        self.poll_messages();

        while let Some(cmd) = self.next_message() {
            self.dispatch_idle(&cmd.verb, &cmd.payload);
        }

        if is_idle {
            let (reload_all, paths) = {
                let mut shared = lock_shared(self);
                (
                    std::mem::take(&mut shared.reload_all_scripts),
                    std::mem::take(&mut shared.script_paths_to_reload),
                )
            };
            if reload_all {
                self.language.reload_all_scripts();
            } else if !paths.is_empty() {
                self.language.reload_scripts(&paths);
            }
        }
    }

    fn send_stack_dump(&self) {
        let depth = self.language.stack_depth();
        let mut frames = Vec::with_capacity(depth);
        for level in 0..depth {
            if let Some(frame) = self.language.frame_info(level) {
                frames.push(frame);
            }
        }
        self.send_message("stack_dump", serialize_stack_dump(&frames));
    }

    fn send_stack_frame_vars(&self, payload: &[Value]) {
        let Some(level) = payload.first().and_then(Value::as_int) else {
            warn!("get_stack_frame_vars command needs [level]");
            return;
        };
        let level = level.max(0) as usize;

        let mut members = Vec::new();
        if let Some(owner) = self.language.frame_instance_owner(level) {
            members.push(("self".to_string(), owner));
        }
        members.extend(self.language.frame_members(level));
        let locals = self.language.frame_locals(level);
        let globals = self.language.globals();

        let total = locals.len() + members.len() + globals.len();
        self.send_message("stack_frame_vars", vec![Value::Int(total as i64)]);
        self.send_stack_vars(&locals, VarKind::Local);
        self.send_stack_vars(&members, VarKind::Member);
        self.send_stack_vars(&globals, VarKind::Global);
    }

    fn send_stack_vars(&self, vars: &[(String, Value)], kind: VarKind) {
        for (name, value) in vars {
            let var = StackVariable {
                name: name.clone(),
                kind,
                value: value.clone(),
            };
            self.send_message("stack_frame_var", var.serialize());
        }
    }

    /// Evaluate an expression against a broken frame: locals and globals
    /// are bound by name, plus every exposed native singleton and every
    /// globally registered script class.
    fn evaluate_expression(&self, payload: &[Value]) {
        let (Some(expression), Some(frame)) = (
            payload.first().and_then(Value::as_str),
            payload.get(1).and_then(Value::as_int),
        ) else {
            warn!("evaluate command needs [expression, frame]");
            return;
        };
        let frame = frame.max(0) as usize;

        let Some(owner) = self.language.frame_instance_owner(frame) else {
            warn!(frame, "evaluate requested for a frame without a script instance");
            return;
        };

        let mut inputs: Vec<(String, Value)> = self.language.frame_locals(frame);
        inputs.extend(self.language.globals());

        for singleton in self.language.native_singletons() {
            if !singleton.exposed || singleton.editor_only {
                continue;
            }
            inputs.push((singleton.name, singleton.object));
        }
        for class in self.language.global_script_classes() {
            match self.language.load_script(&class.path) {
                Some(script) => inputs.push((class.name, script)),
                None => {
                    warn!(class = %class.name, path = %class.path, "could not load global class script");
                }
            }
        }

        let value = match self.language.evaluate(expression, &inputs, Some(&owner)) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, expression, "expression evaluation failed");
                Value::Nil
            }
        };

        let var = StackVariable {
            name: expression.to_string(),
            kind: VarKind::Evaluation,
            value,
        };
        self.send_message("evaluation_return", var.serialize());
    }
}
