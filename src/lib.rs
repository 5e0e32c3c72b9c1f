//! Nether Probe - Remote debug and automation agent
//!
//! This crate embeds a debug agent inside a running console. The agent
//! attaches to a single framed message peer (an editor, a debugger UI or
//! an automation driver) and multiplexes every debug concern over it:
//!
//! - [`RemoteProbe`] - the agent itself: output/error forwarding with
//!   per-second budgets, the break loop, capture dispatch, lifecycle
//! - [`DebugPeer`] - transport seam the host connects the agent to
//! - [`ScriptDebugger`] - script VM seam (breakpoints, stack, evaluation)
//! - [`SceneHost`] - scene graph seam (node tree, input injection, scenes)
//!
//! # Protocol Flow
//!
//! ```text
//! Runtime                         Probe                        Tool
//!   |-- print/error ---------------->|                           |
//!   |                                |-- output / error -------->|
//!   |-- breakpoint hit ------------->|                           |
//!   |                                |-- debug_enter ----------->|
//!   |        (thread parked)         |<-- get_stack_dump --------|
//!   |                                |-- stack_dump ------------>|
//!   |                                |<-- continue --------------|
//!   |<- resumes                      |-- debug_exit ------------>|
//! ```
//!
//! Every frame on the wire is `[verb, thread_id, payload]`. Inbound verbs
//! are either resume/inspection commands serviced by the break loop, or
//! `"namespace:command"` strings routed through registered captures
//! (`core`, `profiler` and `automation` are built in).
//!
//! # Usage
//!
//! ```rust,ignore
//! use nether_probe::{ProbeHosts, ProbeLimits, RemoteProbe};
//!
//! let probe = RemoteProbe::new(peer, ProbeHosts {
//!     language: script_debugger,
//!     scene: Some(scene_host),
//!     monitors: Some(performance),
//! }, ProbeLimits::default());
//!
//! // Once per frame, on the main thread:
//! probe.poll_events(true);
//! probe.tick_profilers(frame_time, process_time, physics_time, physics_frame_time);
//!
//! // From the script VM, on whichever thread hit a breakpoint:
//! probe.debug(true, false);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod language;
pub mod marshal;
pub mod peer;
pub mod probe;
pub mod profiler;
pub mod scene;
pub mod value;

#[cfg(test)]
pub mod test_utils;

pub use clock::{MonotonicClock, SystemClock};
pub use config::ProbeLimits;
pub use error::ProbeError;
pub use hooks::{ErrorHandler, PrintHandler};
pub use language::{EvaluateError, GlobalScriptClass, NativeSingleton, ScriptDebugger};
pub use marshal::{ErrorKind, ErrorRecord, OutputKind, StackFrame, StackVariable, Timestamp, VarKind};
pub use peer::{DebugPeer, PeerError};
pub use probe::capture::{CaptureHandler, CaptureOutcome};
pub use probe::{current_thread_id, ProbeHosts, ProbeThreadId, RemoteProbe};
pub use profiler::{EngineProfiler, PerformanceMonitors};
pub use scene::{
    InjectedInput, MouseMode, NodeId, NodeInfo, NodeSpatial, SceneHost, SYNTHETIC_DEVICE_ID,
};
pub use value::{ObjectId, Value};
