//! The remote debug agent.
//!
//! [`RemoteProbe`] glues the debug concerns together: it buffers prints and
//! errors under per-second budgets, flushes them to the peer in batches,
//! demultiplexes inbound commands into per-thread inboxes, dispatches
//! namespaced captures and runs the synchronous break loop.
//!
//! # Locking
//!
//! All mutable agent state lives in one [`Mutex`]. The only state outside
//! it is the pair of flush-guard atomics (`flushing`, `flush_thread`),
//! which the print/error entry points must read *before* taking the mutex:
//! during a flush the mutex is already held, and a handler that prints
//! from the flush thread would otherwise deadlock. Those atomics are only
//! written while the mutex is held.

pub mod automation;
pub mod capture;
pub mod debug_loop;
pub mod inbox;
pub mod performance;


use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hashbrown::HashMap;

use crate::clock::{MonotonicClock, SystemClock};
use crate::config::ProbeLimits;
use crate::hooks;
use crate::language::ScriptDebugger;
use crate::marshal::{ErrorKind, ErrorRecord, OutputKind, Timestamp};
use crate::peer::{DebugPeer, PeerError};
use crate::profiler::{EngineProfiler, PerformanceMonitors};
use crate::scene::SceneHost;
use crate::value::Value;

use capture::CaptureHandler;
use inbox::Command;
use performance::PerformanceProfiler;

/// Stable per-OS-thread identifier.
///
/// Assigned from a process-wide counter the first time a thread touches the
/// agent; never reused, never migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeThreadId(pub u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Identifier of the calling OS thread.
pub fn current_thread_id() -> ProbeThreadId {
    THREAD_ID.with(|cell| {
        if cell.get() == 0 {
            cell.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        ProbeThreadId(cell.get())
    })
}

/// Host services the agent attaches to.
pub struct ProbeHosts {
    pub language: Arc<dyn ScriptDebugger>,
    /// Scene graph and input, when the host has one. Automation commands
    /// are rejected without it.
    pub scene: Option<Arc<dyn SceneHost>>,
    /// Performance counters; when present a `performance` profiler is
    /// registered and enabled at construction.
    pub monitors: Option<Arc<dyn PerformanceMonitors>>,
}

/// One buffered output line.
struct OutputLine {
    text: String,
    kind: OutputKind,
}

struct ProfilerEntry {
    profiler: Arc<dyn EngineProfiler>,
    active: bool,
}

/// Everything guarded by the core mutex.
pub(crate) struct Shared {
    output: Vec<OutputLine>,
    errors: VecDeque<ErrorRecord>,

    char_count: usize,
    err_count: u32,
    warn_count: u32,
    n_messages_dropped: u32,
    n_errors_dropped: u32,
    n_warnings_dropped: u32,
    last_reset_ms: u64,

    pub(crate) inboxes: HashMap<ProbeThreadId, VecDeque<Command>>,
    pub(crate) captures: HashMap<String, Arc<dyn CaptureHandler>>,
    profilers: HashMap<String, ProfilerEntry>,

    pub(crate) script_paths_to_reload: Vec<String>,
    pub(crate) reload_all_scripts: bool,
}

/// In-process remote debug and automation agent.
///
/// Construct with [`RemoteProbe::new`]; the returned [`Arc`] is the only
/// handle. Dropping the last clone uninstalls the print/error hooks.
pub struct RemoteProbe {
    pub(crate) peer: Arc<dyn DebugPeer>,
    pub(crate) language: Arc<dyn ScriptDebugger>,
    pub(crate) scene: Option<Arc<dyn SceneHost>>,
    pub(crate) clock: Arc<dyn MonotonicClock>,
    limits: ProbeLimits,
    main_thread: ProbeThreadId,

    // Flush guard, readable without the mutex (see module docs).
    flushing: AtomicBool,
    flush_thread: AtomicU64,

    allow_focus_steal: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    pub(crate) shared: Mutex<Shared>,
    self_weak: Weak<RemoteProbe>,
}

pub(crate) fn lock_shared<'a>(probe: &'a RemoteProbe) -> MutexGuard<'a, Shared> {
    match probe.shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RemoteProbe {
    /// Create the agent, register the built-in captures, install the
    /// print/error hooks and seed the inbox of the calling thread, which
    /// is recorded as the main thread.
    pub fn new(peer: Arc<dyn DebugPeer>, hosts: ProbeHosts, limits: ProbeLimits) -> Arc<Self> {
        Self::with_clock(peer, hosts, limits, Arc::new(SystemClock::new()))
    }

    /// [`RemoteProbe::new`] with an explicit time source.
    pub fn with_clock(
        peer: Arc<dyn DebugPeer>,
        hosts: ProbeHosts,
        limits: ProbeLimits,
        clock: Arc<dyn MonotonicClock>,
    ) -> Arc<Self> {
        let main_thread = current_thread_id();
        let monitors = hosts.monitors;

        let probe = Arc::new_cyclic(|weak: &Weak<RemoteProbe>| {
            let mut captures: HashMap<String, Arc<dyn CaptureHandler>> = HashMap::new();
            captures.insert(
                "core".to_string(),
                Arc::new(capture::CoreCapture::new(weak.clone())),
            );
            captures.insert(
                "profiler".to_string(),
                Arc::new(capture::ProfilerCapture::new(weak.clone())),
            );
            captures.insert(
                "automation".to_string(),
                Arc::new(automation::AutomationCapture::new(weak.clone())),
            );

            let mut inboxes = HashMap::new();
            inboxes.insert(main_thread, VecDeque::new());

            RemoteProbe {
                peer,
                language: hosts.language,
                scene: hosts.scene,
                clock: clock.clone(),
                limits,
                main_thread,
                flushing: AtomicBool::new(false),
                flush_thread: AtomicU64::new(0),
                allow_focus_steal: Mutex::new(None),
                shared: Mutex::new(Shared {
                    output: Vec::new(),
                    errors: VecDeque::new(),
                    char_count: 0,
                    err_count: 0,
                    warn_count: 0,
                    n_messages_dropped: 0,
                    n_errors_dropped: 0,
                    n_warnings_dropped: 0,
                    last_reset_ms: 0,
                    inboxes,
                    captures,
                    profilers: HashMap::new(),
                    script_paths_to_reload: Vec::new(),
                    reload_all_scripts: false,
                }),
                self_weak: weak.clone(),
            }
        });

        if let Some(monitors) = monitors {
            let perf: Arc<dyn EngineProfiler> = Arc::new(PerformanceProfiler::new(
                Arc::downgrade(&probe),
                monitors,
                clock,
            ));
            probe.register_profiler("performance", perf);
            probe.profiler_enable("performance", true, &[]);
        }

        hooks::add_print_handler(probe.self_weak.clone());
        hooks::add_error_handler(probe.self_weak.clone());

        probe
    }

    /// Thread recorded as main at construction.
    pub fn main_thread_id(&self) -> ProbeThreadId {
        self.main_thread
    }

    /// Install the hook invoked right before `debug_enter` is sent, so the
    /// OS can bring the editor window forward.
    pub fn set_allow_focus_steal(&self, hook: Option<Box<dyn Fn() + Send + Sync>>) {
        let mut slot = match self.allow_focus_steal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = hook;
    }

    pub(crate) fn invoke_focus_steal(&self) {
        let slot = match self.allow_focus_steal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(hook) = slot.as_ref() {
            hook();
        }
    }

    pub(crate) fn is_peer_connected(&self) -> bool {
        self.peer.is_peer_connected()
    }

    /// Frame and queue one outbound message. The caller already holds the
    /// core mutex; failed sends are counted as drops.
    pub(crate) fn put_msg_locked(
        &self,
        shared: &mut Shared,
        verb: &str,
        payload: Vec<Value>,
    ) -> Result<(), PeerError> {
        let frame = [
            Value::Str(verb.to_string()),
            Value::Int(current_thread_id().0 as i64),
            Value::Array(payload),
        ];
        match self.peer.put_message(&frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                shared.n_messages_dropped += 1;
                Err(err)
            }
        }
    }

    /// Send one message to the tool, silently dropped when disconnected.
    pub fn send_message(&self, verb: &str, payload: Vec<Value>) {
        let mut shared = lock_shared(self);
        if self.is_peer_connected() {
            let _ = self.put_msg_locked(&mut shared, verb, payload);
        }
    }

    fn is_reentrant_flush(&self, thread: ProbeThreadId) -> bool {
        self.flushing.load(Ordering::Acquire) && self.flush_thread.load(Ordering::Acquire) == thread.0
    }

    /// Buffer one printed line under the character budget.
    ///
    /// Truncated lines get a `[...]` suffix plus a one-off overflow notice;
    /// once the window budget is exhausted further lines vanish entirely.
    pub fn record_print(&self, text: &str, is_error: bool, is_rich: bool) {
        if self.is_reentrant_flush(current_thread_id()) {
            // A handler printing from inside the flush. Dropping it is the
            // only option that terminates.
            return;
        }

        let mut shared = lock_shared(self);

        let total_chars = text.chars().count();
        let remaining = self.limits.max_chars_per_second.saturating_sub(shared.char_count);
        let allowed = remaining.min(total_chars);

        if allowed == 0 && total_chars > 0 {
            return;
        }

        shared.char_count += allowed;

        if !self.is_peer_connected() {
            return;
        }

        let truncated = allowed < total_chars;
        let mut line: String = if truncated {
            text.chars().take(allowed).collect()
        } else {
            text.to_string()
        };
        if truncated {
            line.push_str("[...]");
        }

        let kind = if is_error {
            OutputKind::Error
        } else if is_rich {
            OutputKind::LogRich
        } else {
            OutputKind::Log
        };
        shared.output.push(OutputLine { text: line, kind });

        if truncated {
            shared.output.push(OutputLine {
                text: "[output overflow, print less text!]".to_string(),
                kind: OutputKind::Error,
            });
        }
    }

    /// Buffer one error or warning under the per-second budget, stamped
    /// with the monotonic time of day and the script adapter's current
    /// stack.
    #[allow(clippy::too_many_arguments)]
    pub fn record_error(
        &self,
        func: &str,
        file: &str,
        line: u32,
        error: &str,
        description: &str,
        editor_notify: bool,
        kind: ErrorKind,
    ) {
        if self.is_reentrant_flush(current_thread_id()) {
            return;
        }

        let record = ErrorRecord {
            func: func.to_string(),
            file: file.to_string(),
            line,
            error: error.to_string(),
            description: description.to_string(),
            warning: kind == ErrorKind::Warning,
            timestamp: Timestamp::from_ticks_ms(self.clock.ticks_ms()),
            editor_notify,
            callstack: self.language.current_stack(),
        };

        let mut shared = lock_shared(self);

        if record.warning {
            shared.warn_count += 1;
        } else {
            shared.err_count += 1;
        }

        if !self.is_peer_connected() {
            return;
        }

        if record.warning {
            if shared.warn_count > self.limits.max_warnings_per_second {
                shared.n_warnings_dropped += 1;
                if shared.n_warnings_dropped == 1 {
                    // One notice per window, not one per dropped warning.
                    let overflow = self.overflow_record(
                        "TOO_MANY_WARNINGS",
                        "Too many warnings! Ignoring warnings for up to 1 second.",
                    );
                    shared.errors.push_back(overflow);
                }
            } else {
                shared.errors.push_back(record);
            }
        } else if shared.err_count > self.limits.max_errors_per_second {
            shared.n_errors_dropped += 1;
            if shared.n_errors_dropped == 1 {
                let overflow = self.overflow_record(
                    "TOO_MANY_ERRORS",
                    "Too many errors! Ignoring errors for up to 1 second.",
                );
                shared.errors.push_back(overflow);
            }
        } else {
            shared.errors.push_back(record);
        }
    }

    fn overflow_record(&self, what: &str, description: &str) -> ErrorRecord {
        ErrorRecord {
            func: String::new(),
            file: String::new(),
            line: 0,
            error: what.to_string(),
            description: description.to_string(),
            warning: false,
            timestamp: Timestamp::from_ticks_ms(self.clock.ticks_ms()),
            editor_notify: false,
            callstack: Vec::new(),
        }
    }

    /// Drain buffered output and errors to the peer and roll the rate
    /// window when a second has passed.
    pub fn flush_output(&self) {
        let thread = current_thread_id();
        let mut shared = lock_shared(self);
        self.flush_thread.store(thread.0, Ordering::Release);
        self.flushing.store(true, Ordering::Release);
        self.flush_locked(&mut shared);
        self.flushing.store(false, Ordering::Release);
    }

    fn flush_locked(&self, shared: &mut Shared) {
        if !self.is_peer_connected() {
            return;
        }

        if shared.n_messages_dropped > 0 {
            let overflow = self.overflow_record(
                "TOO_MANY_MESSAGES",
                &format!(
                    "Too many messages! {} messages were dropped. Profiling may misbehave, try raising 'max_queued_messages' on the peer.",
                    shared.n_messages_dropped
                ),
            );
            if self
                .put_msg_locked(shared, "error", overflow.serialize())
                .is_ok()
            {
                shared.n_messages_dropped = 0;
            }
        }

        if !shared.output.is_empty() {
            // Coalesce runs of plain log lines into one string so the wire
            // carries fewer messages.
            let mut joined: Vec<String> = Vec::new();
            let mut strings: Vec<Value> = Vec::new();
            let mut types: Vec<Value> = Vec::new();

            for line in shared.output.drain(..) {
                match line.kind {
                    OutputKind::Log => joined.push(line.text),
                    boundary => {
                        if !joined.is_empty() {
                            strings.push(Value::Str(joined.join("\n")));
                            types.push(OutputKind::Log.to_value());
                            joined.clear();
                        }
                        strings.push(Value::Str(line.text));
                        types.push(boundary.to_value());
                    }
                }
            }
            if !joined.is_empty() {
                strings.push(Value::Str(joined.join("\n")));
                types.push(OutputKind::Log.to_value());
            }

            let payload = vec![Value::Array(strings), Value::Array(types)];
            let _ = self.put_msg_locked(shared, "output", payload);
        }

        while let Some(record) = shared.errors.pop_front() {
            let _ = self.put_msg_locked(shared, "error", record.serialize());
        }

        let now = self.clock.ticks_ms();
        if now - shared.last_reset_ms > 1000 {
            shared.last_reset_ms = now;
            shared.char_count = 0;
            shared.err_count = 0;
            shared.warn_count = 0;
            shared.n_errors_dropped = 0;
            shared.n_warnings_dropped = 0;
            // n_messages_dropped survives the window; it only resets once
            // its overflow notice was actually delivered.
        }
    }

    // Profiler registry.

    /// Register a named profiler. Last writer wins on re-registration.
    pub fn register_profiler(&self, name: &str, profiler: Arc<dyn EngineProfiler>) {
        let mut shared = lock_shared(self);
        shared.profilers.insert(
            name.to_string(),
            ProfilerEntry {
                profiler,
                active: false,
            },
        );
    }

    pub fn unregister_profiler(&self, name: &str) {
        let mut shared = lock_shared(self);
        shared.profilers.remove(name);
    }

    pub fn has_profiler(&self, name: &str) -> bool {
        lock_shared(self).profilers.contains_key(name)
    }

    /// Switch a registered profiler. Returns false for unknown names.
    pub fn profiler_enable(&self, name: &str, enable: bool, options: &[Value]) -> bool {
        let profiler = {
            let mut shared = lock_shared(self);
            match shared.profilers.get_mut(name) {
                Some(entry) => {
                    entry.active = enable;
                    entry.profiler.clone()
                }
                None => return false,
            }
        };
        // Toggled outside the mutex; profilers may send messages.
        profiler.toggle(enable, options);
        true
    }

    /// Per-frame hook forwarded to every active profiler.
    pub fn tick_profilers(
        &self,
        frame_time: f64,
        process_time: f64,
        physics_time: f64,
        physics_frame_time: f64,
    ) {
        let active: Vec<Arc<dyn EngineProfiler>> = {
            let shared = lock_shared(self);
            shared
                .profilers
                .values()
                .filter(|entry| entry.active)
                .map(|entry| entry.profiler.clone())
                .collect()
        };
        for profiler in active {
            profiler.tick(frame_time, process_time, physics_time, physics_frame_time);
        }
    }

    // Deferred script reloads, executed from the idle pump.

    pub(crate) fn defer_reload_paths(&self, payload: &[Value]) {
        let mut shared = lock_shared(self);
        shared.script_paths_to_reload = payload
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }

    pub(crate) fn defer_reload_all(&self) {
        let mut shared = lock_shared(self);
        shared.reload_all_scripts = true;
    }
}

impl hooks::PrintHandler for RemoteProbe {
    fn on_print(&self, text: &str, is_error: bool, is_rich: bool) {
        self.record_print(text, is_error, is_rich);
    }
}

impl hooks::ErrorHandler for RemoteProbe {
    fn on_error(
        &self,
        func: &str,
        file: &str,
        line: u32,
        error: &str,
        description: &str,
        editor_notify: bool,
        kind: ErrorKind,
    ) {
        self.record_error(func, file, line, error, description, editor_notify, kind);
    }
}

impl Drop for RemoteProbe {
    fn drop(&mut self) {
        let print_weak: Weak<dyn hooks::PrintHandler> = self.self_weak.clone();
        hooks::remove_print_handler(&print_weak);
        let error_weak: Weak<dyn hooks::ErrorHandler> = self.self_weak.clone();
        hooks::remove_error_handler(&error_weak);
    }
}
