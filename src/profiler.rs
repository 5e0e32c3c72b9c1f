//! Named profilers and the performance-monitor seam.
//!
//! Profilers register with the agent by name; the tool switches them with
//! `profiler:<name>` commands and the host runtime drives them once per
//! frame through [`RemoteProbe::tick_profilers`](crate::RemoteProbe::tick_profilers).

use crate::value::Value;

/// A named profiler the debugger tool can switch on and off.
pub trait EngineProfiler: Send + Sync {
    /// Enable or disable, with optional tool-supplied options.
    fn toggle(&self, enable: bool, options: &[Value]);

    /// Per-frame hook. Only called while the profiler is enabled.
    fn tick(
        &self,
        frame_time: f64,
        process_time: f64,
        physics_time: f64,
        physics_frame_time: f64,
    );
}

/// Host performance counters consumed by the built-in `performance`
/// profiler.
pub trait PerformanceMonitors: Send + Sync {
    /// Number of built-in monitors. Built-ins occupy indices
    /// `0..monitor_count()` in every published frame.
    fn monitor_count(&self) -> usize;
    fn monitor(&self, index: usize) -> Value;

    fn custom_monitor_names(&self) -> Vec<String>;
    /// Display type hints, one per custom monitor name.
    fn custom_monitor_types(&self) -> Vec<Value>;
    fn custom_monitor(&self, name: &str) -> Value;

    /// Counter bumped whenever the custom monitor set changes; triggers a
    /// fresh `performance:profile_names` publication.
    fn monitor_modification_time(&self) -> u64;
}
