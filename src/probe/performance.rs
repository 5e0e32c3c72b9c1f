//! Built-in `performance` profiler.
//!
//! Publishes one monitor snapshot per second while enabled: built-in
//! monitors first, custom monitors after, in the order announced by the
//! most recent `performance:profile_names` message.

use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use super::RemoteProbe;
use crate::clock::MonotonicClock;
use crate::profiler::{EngineProfiler, PerformanceMonitors};
use crate::value::Value;

struct PerfState {
    last_send_ms: u64,
    last_modification_time: u64,
}

pub(crate) struct PerformanceProfiler {
    probe: Weak<RemoteProbe>,
    monitors: Arc<dyn PerformanceMonitors>,
    clock: Arc<dyn MonotonicClock>,
    state: Mutex<PerfState>,
}

impl PerformanceProfiler {
    pub(crate) fn new(
        probe: Weak<RemoteProbe>,
        monitors: Arc<dyn PerformanceMonitors>,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        Self {
            probe,
            monitors,
            clock,
            state: Mutex::new(PerfState {
                last_send_ms: 0,
                last_modification_time: 0,
            }),
        }
    }
}

impl EngineProfiler for PerformanceProfiler {
    fn toggle(&self, _enable: bool, _options: &[Value]) {}

    fn tick(
        &self,
        _frame_time: f64,
        _process_time: f64,
        _physics_time: f64,
        _physics_frame_time: f64,
    ) {
        let Some(probe) = self.probe.upgrade() else {
            return;
        };

        let now = self.clock.ticks_ms();
        let names_dirty = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if now.saturating_sub(state.last_send_ms) < 1000 {
                return;
            }
            state.last_send_ms = now;

            let modification_time = self.monitors.monitor_modification_time();
            let dirty = modification_time > state.last_modification_time;
            if dirty {
                state.last_modification_time = modification_time;
            }
            dirty
        };

        let custom_names = self.monitors.custom_monitor_names();
        if names_dirty {
            let names: Vec<Value> = custom_names
                .iter()
                .map(|name| Value::Str(name.clone()))
                .collect();
            let types = self.monitors.custom_monitor_types();
            probe.send_message(
                "performance:profile_names",
                vec![Value::Array(names), Value::Array(types)],
            );
        }

        let built_in = self.monitors.monitor_count();
        let mut frame = Vec::with_capacity(built_in + custom_names.len());
        for index in 0..built_in {
            frame.push(self.monitors.monitor(index));
        }
        for name in &custom_names {
            let value = self.monitors.custom_monitor(name);
            if value.is_num() {
                frame.push(value);
            } else {
                warn!(monitor = %name, "value of custom monitor is not a number");
                frame.push(Value::Nil);
            }
        }

        probe.send_message("performance:profile_frame", frame);
    }
}
