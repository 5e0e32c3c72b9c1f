//! Capture registry and dispatcher, plus the `core` and `profiler`
//! captures.
//!
//! A capture is a handler registered under a namespace. Inbound verbs of
//! the form `"ns:cmd"` route to the handler registered for `ns`; a bare
//! verb belongs to `core`. The registry map lives under the core mutex but
//! handlers run outside it, since they routinely call back into the agent.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::{lock_shared, RemoteProbe};
use crate::error::ProbeError;
use crate::value::Value;

/// Outcome of asking a capture to handle one command.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// The command was recognized and handled.
    Captured,
    /// The namespace does not know this command.
    Unrecognized,
    /// The command is known but its payload was malformed.
    Invalid(ProbeError),
}

/// Handler for one registered capture namespace.
pub trait CaptureHandler: Send + Sync {
    fn capture(&self, cmd: &str, payload: &[Value]) -> CaptureOutcome;
}

impl RemoteProbe {
    /// Register a capture under a namespace. Last writer wins.
    pub fn register_capture(&self, namespace: &str, handler: Arc<dyn CaptureHandler>) {
        let mut shared = lock_shared(self);
        shared.captures.insert(namespace.to_string(), handler);
    }

    pub fn unregister_capture(&self, namespace: &str) {
        let mut shared = lock_shared(self);
        shared.captures.remove(namespace);
    }

    pub fn has_capture(&self, namespace: &str) -> bool {
        lock_shared(self).captures.contains_key(namespace)
    }

    fn capture_handler(&self, namespace: &str) -> Option<Arc<dyn CaptureHandler>> {
        lock_shared(self).captures.get(namespace).cloned()
    }

    /// Break-loop routing for a verb the loop itself did not recognize.
    ///
    /// Anything short of [`CaptureOutcome::Captured`] surfaces to the tool
    /// author as an unknown-message warning at the call site.
    pub(crate) fn try_capture(&self, verb: &str, payload: &[Value]) -> CaptureOutcome {
        let Some(idx) = verb.find(':') else {
            return CaptureOutcome::Unrecognized;
        };
        let (namespace, cmd) = (&verb[..idx], &verb[idx + 1..]);
        let Some(handler) = self.capture_handler(namespace) else {
            return CaptureOutcome::Unrecognized;
        };
        handler.capture(cmd, payload)
    }

    /// Idle-path routing: bare verbs go to `core`, unknown namespaces and
    /// unrecognized commands are dropped without noise.
    pub(crate) fn dispatch_idle(&self, verb: &str, payload: &[Value]) {
        let (namespace, cmd) = match verb.find(':') {
            None => ("core", verb),
            Some(idx) => (&verb[..idx], &verb[idx + 1..]),
        };
        let Some(handler) = self.capture_handler(namespace) else {
            return;
        };
        if let CaptureOutcome::Invalid(err) = handler.capture(cmd, payload) {
            debug!(verb, %err, "capture rejected payload");
        }
    }
}

/// Built-in `core` capture: breakpoints, break policy flags, deferred
/// script reloads and break requests, serviced outside the break loop.
pub(crate) struct CoreCapture {
    probe: Weak<RemoteProbe>,
}

impl CoreCapture {
    pub(crate) fn new(probe: Weak<RemoteProbe>) -> Self {
        Self { probe }
    }
}

impl CaptureHandler for CoreCapture {
    fn capture(&self, cmd: &str, payload: &[Value]) -> CaptureOutcome {
        let Some(probe) = self.probe.upgrade() else {
            return CaptureOutcome::Unrecognized;
        };
        match cmd {
            "reload_scripts" => probe.defer_reload_paths(payload),
            "reload_all_scripts" => probe.defer_reload_all(),
            "breakpoint" => {
                if payload.len() < 3 {
                    return CaptureOutcome::Invalid(ProbeError::invalid(cmd, "expected [line, source, set]"));
                }
                let (Some(line), Some(source), Some(set)) =
                    (payload[0].as_int(), payload[1].as_str(), payload[2].as_bool())
                else {
                    return CaptureOutcome::Invalid(ProbeError::invalid(cmd, "expected [line, source, set]"));
                };
                if set {
                    probe.language.insert_breakpoint(source, line as u32);
                } else {
                    probe.language.remove_breakpoint(source, line as u32);
                }
            }
            "set_skip_breakpoints" => {
                let Some(skip) = payload.first().and_then(Value::as_bool) else {
                    return CaptureOutcome::Invalid(ProbeError::invalid(cmd, "expected [bool]"));
                };
                probe.language.set_skip_breakpoints(skip);
            }
            "set_ignore_error_breaks" => {
                let Some(ignore) = payload.first().and_then(Value::as_bool) else {
                    return CaptureOutcome::Invalid(ProbeError::invalid(cmd, "expected [bool]"));
                };
                probe.language.set_ignore_error_breaks(ignore);
            }
            "break" => probe.language.request_break(),
            _ => return CaptureOutcome::Unrecognized,
        }
        CaptureOutcome::Captured
    }
}

/// Built-in `profiler` capture: `profiler:<name>` with `[enable, opts?]`.
pub(crate) struct ProfilerCapture {
    probe: Weak<RemoteProbe>,
}

impl ProfilerCapture {
    pub(crate) fn new(probe: Weak<RemoteProbe>) -> Self {
        Self { probe }
    }
}

impl CaptureHandler for ProfilerCapture {
    fn capture(&self, cmd: &str, payload: &[Value]) -> CaptureOutcome {
        let Some(probe) = self.probe.upgrade() else {
            return CaptureOutcome::Unrecognized;
        };
        // A malformed toggle reads as unrecognized on purpose: the tool
        // sees the unknown-message warning rather than a silent no-op.
        let Some(enable) = payload.first().and_then(Value::as_bool) else {
            debug!(profiler = cmd, "profiler toggle without a leading bool");
            return CaptureOutcome::Unrecognized;
        };
        let options = match payload.get(1) {
            None => &[][..],
            Some(Value::Array(opts)) => opts.as_slice(),
            Some(other) => {
                debug!(profiler = cmd, kind = other.kind_name(), "profiler options must be an array");
                return CaptureOutcome::Unrecognized;
            }
        };
        if !probe.has_profiler(cmd) {
            return CaptureOutcome::Unrecognized;
        }
        probe.profiler_enable(cmd, enable, options);
        CaptureOutcome::Captured
    }
}
