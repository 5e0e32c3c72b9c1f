//! Shared test fixtures: a recording peer, mock host seams and a manually
//! advanced clock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::clock::MonotonicClock;
use crate::language::{EvaluateError, GlobalScriptClass, NativeSingleton, ScriptDebugger};
use crate::marshal::StackFrame;
use crate::peer::{DebugPeer, PeerError};
use crate::scene::{InjectedInput, MouseMode, NodeId, NodeInfo, NodeSpatial, SceneHost};
use crate::value::Value;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Guard taken by tests that assert exact output frames or exercise the
/// global hook registries; a concurrently running hook test would
/// otherwise leak lines into their buffers.
pub fn exclusive() -> MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    match GUARD.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Verb of an outbound frame (`[verb, thread_id, payload]`).
pub fn frame_verb(frame: &[Value]) -> &str {
    frame[0].as_str().expect("frame verb must be a string")
}

/// Payload of an outbound frame.
pub fn frame_payload(frame: &[Value]) -> &[Value] {
    frame[2].as_array().expect("frame payload must be an array")
}

// ============================================================================
// Peer
// ============================================================================

struct PeerState {
    inbound: VecDeque<Vec<Value>>,
    sent: Vec<Vec<Value>>,
    connected: bool,
    can_block: bool,
    fail_sends: bool,
}

type SendHook = Box<dyn Fn(&[Value]) + Send + Sync>;

/// In-memory peer that records every outbound frame.
pub struct RecordingPeer {
    state: Mutex<PeerState>,
    /// Invoked for each frame before it is recorded. Used to simulate a
    /// handler that emits output from inside the flush path.
    on_send: Mutex<Option<SendHook>>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PeerState {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                connected: true,
                can_block: true,
                fail_sends: false,
            }),
            on_send: Mutex::new(None),
        }
    }

    pub fn push_inbound(&self, verb: &str, thread_id: u64, payload: Vec<Value>) {
        lock(&self.state).inbound.push_back(vec![
            Value::Str(verb.to_string()),
            Value::Int(thread_id as i64),
            Value::Array(payload),
        ]);
    }

    /// Queue a frame that does not follow the `[verb, thread, payload]`
    /// shape.
    pub fn push_inbound_raw(&self, frame: Vec<Value>) {
        lock(&self.state).inbound.push_back(frame);
    }

    pub fn sent_frames(&self) -> Vec<Vec<Value>> {
        lock(&self.state).sent.clone()
    }

    pub fn sent_verbs(&self) -> Vec<String> {
        lock(&self.state)
            .sent
            .iter()
            .map(|frame| frame_verb(frame).to_string())
            .collect()
    }

    pub fn frames_with_verb(&self, verb: &str) -> Vec<Vec<Value>> {
        lock(&self.state)
            .sent
            .iter()
            .filter(|frame| frame_verb(frame) == verb)
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn set_can_block(&self, can_block: bool) {
        lock(&self.state).can_block = can_block;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    pub fn set_on_send(&self, hook: Option<SendHook>) {
        *lock(&self.on_send) = hook;
    }
}

impl Default for RecordingPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugPeer for RecordingPeer {
    fn poll(&self) {}

    fn has_message(&self) -> bool {
        !lock(&self.state).inbound.is_empty()
    }

    fn get_message(&self) -> Option<Vec<Value>> {
        lock(&self.state).inbound.pop_front()
    }

    fn put_message(&self, frame: &[Value]) -> Result<(), PeerError> {
        if let Some(hook) = lock(&self.on_send).as_ref() {
            hook(frame);
        }
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(PeerError::QueueFull);
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn is_peer_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn can_block(&self) -> bool {
        lock(&self.state).can_block
    }
}

// ============================================================================
// Script debugger
// ============================================================================

#[derive(Default)]
struct LangState {
    skip_breakpoints: bool,
    ignore_error_breaks: bool,
    breakpoints: Vec<(String, u32)>,
    depth: Option<i32>,
    lines_left: Option<i32>,
    break_requests: u32,
    current_error: String,
    stack: Vec<StackFrame>,
    locals: Vec<(String, Value)>,
    members: Vec<(String, Value)>,
    globals: Vec<(String, Value)>,
    instance_owner: Option<Value>,
    singletons: Vec<NativeSingleton>,
    script_classes: Vec<GlobalScriptClass>,
    loadable_scripts: BTreeMap<String, Value>,
    reloaded_paths: Vec<String>,
    reload_all_count: u32,
}

/// Scriptable stand-in for the host scripting layer.
///
/// `evaluate` understands a bound name on its own and `name+literal` /
/// `name+name` integer sums, which is as much expression language as the
/// tests need.
pub struct MockScriptDebugger {
    state: Mutex<LangState>,
}

impl MockScriptDebugger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LangState::default()),
        }
    }

    pub fn set_current_error(&self, error: &str) {
        lock(&self.state).current_error = error.to_string();
    }

    pub fn set_stack(&self, stack: Vec<StackFrame>) {
        lock(&self.state).stack = stack;
    }

    pub fn set_locals(&self, locals: Vec<(String, Value)>) {
        lock(&self.state).locals = locals;
    }

    pub fn set_members(&self, members: Vec<(String, Value)>) {
        lock(&self.state).members = members;
    }

    pub fn set_globals(&self, globals: Vec<(String, Value)>) {
        lock(&self.state).globals = globals;
    }

    pub fn set_instance_owner(&self, owner: Option<Value>) {
        lock(&self.state).instance_owner = owner;
    }

    pub fn set_singletons(&self, singletons: Vec<NativeSingleton>) {
        lock(&self.state).singletons = singletons;
    }

    pub fn set_script_classes(&self, classes: Vec<GlobalScriptClass>) {
        lock(&self.state).script_classes = classes;
    }

    pub fn add_loadable_script(&self, path: &str, script: Value) {
        lock(&self.state)
            .loadable_scripts
            .insert(path.to_string(), script);
    }

    pub fn breakpoints(&self) -> Vec<(String, u32)> {
        lock(&self.state).breakpoints.clone()
    }

    pub fn depth(&self) -> Option<i32> {
        lock(&self.state).depth
    }

    pub fn lines_left(&self) -> Option<i32> {
        lock(&self.state).lines_left
    }

    pub fn break_requests(&self) -> u32 {
        lock(&self.state).break_requests
    }

    pub fn reloaded_paths(&self) -> Vec<String> {
        lock(&self.state).reloaded_paths.clone()
    }

    pub fn reload_all_count(&self) -> u32 {
        lock(&self.state).reload_all_count
    }
}

impl Default for MockScriptDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptDebugger for MockScriptDebugger {
    fn insert_breakpoint(&self, source: &str, line: u32) {
        lock(&self.state).breakpoints.push((source.to_string(), line));
    }

    fn remove_breakpoint(&self, source: &str, line: u32) {
        lock(&self.state)
            .breakpoints
            .retain(|(s, l)| !(s == source && *l == line));
    }

    fn set_skip_breakpoints(&self, skip: bool) {
        lock(&self.state).skip_breakpoints = skip;
    }

    fn is_skipping_breakpoints(&self) -> bool {
        lock(&self.state).skip_breakpoints
    }

    fn set_ignore_error_breaks(&self, ignore: bool) {
        lock(&self.state).ignore_error_breaks = ignore;
    }

    fn is_ignoring_error_breaks(&self) -> bool {
        lock(&self.state).ignore_error_breaks
    }

    fn set_depth(&self, depth: i32) {
        lock(&self.state).depth = Some(depth);
    }

    fn set_lines_left(&self, lines: i32) {
        lock(&self.state).lines_left = Some(lines);
    }

    fn request_break(&self) {
        lock(&self.state).break_requests += 1;
    }

    fn current_error(&self) -> String {
        lock(&self.state).current_error.clone()
    }

    fn current_stack(&self) -> Vec<StackFrame> {
        lock(&self.state).stack.clone()
    }

    fn stack_depth(&self) -> usize {
        lock(&self.state).stack.len()
    }

    fn frame_info(&self, level: usize) -> Option<StackFrame> {
        lock(&self.state).stack.get(level).cloned()
    }

    fn frame_instance_owner(&self, _level: usize) -> Option<Value> {
        lock(&self.state).instance_owner.clone()
    }

    fn frame_members(&self, _level: usize) -> Vec<(String, Value)> {
        lock(&self.state).members.clone()
    }

    fn frame_locals(&self, _level: usize) -> Vec<(String, Value)> {
        lock(&self.state).locals.clone()
    }

    fn globals(&self) -> Vec<(String, Value)> {
        lock(&self.state).globals.clone()
    }

    fn native_singletons(&self) -> Vec<NativeSingleton> {
        lock(&self.state).singletons.clone()
    }

    fn global_script_classes(&self) -> Vec<GlobalScriptClass> {
        lock(&self.state).script_classes.clone()
    }

    fn load_script(&self, path: &str) -> Option<Value> {
        lock(&self.state).loadable_scripts.get(path).cloned()
    }

    fn evaluate(
        &self,
        expression: &str,
        inputs: &[(String, Value)],
        _base: Option<&Value>,
    ) -> Result<Value, EvaluateError> {
        let resolve = |term: &str| -> Option<Value> {
            let term = term.trim();
            if let Ok(literal) = term.parse::<i64>() {
                return Some(Value::Int(literal));
            }
            inputs
                .iter()
                .find(|(name, _)| name == term)
                .map(|(_, value)| value.clone())
        };

        if let Some(value) = resolve(expression) {
            return Ok(value);
        }
        if let Some((lhs, rhs)) = expression.split_once('+') {
            let (Some(lhs), Some(rhs)) = (resolve(lhs), resolve(rhs)) else {
                return Err(EvaluateError::Execution(format!(
                    "unknown identifier in '{expression}'"
                )));
            };
            let (Some(lhs), Some(rhs)) = (lhs.as_int(), rhs.as_int()) else {
                return Err(EvaluateError::Execution("operands must be integers".into()));
            };
            return Ok(Value::Int(lhs + rhs));
        }
        Err(EvaluateError::Parse(format!("cannot parse '{expression}'")))
    }

    fn reload_scripts(&self, paths: &[String]) {
        lock(&self.state).reloaded_paths.extend_from_slice(paths);
    }

    fn reload_all_scripts(&self) {
        lock(&self.state).reload_all_count += 1;
    }
}

// ============================================================================
// Scene host
// ============================================================================

struct MockNode {
    name: String,
    path: String,
    class: String,
    spatial: Option<NodeSpatial>,
    children: Vec<usize>,
    properties: BTreeMap<String, Value>,
    methods: BTreeMap<String, Value>,
}

struct SceneState {
    nodes: Vec<MockNode>,
    current_scene: Option<String>,
    changed_scene: Option<String>,
    reload_count: u32,
    paused: Option<bool>,
    time_scale: Option<f64>,
    injected: Vec<InjectedInput>,
    actions: Vec<(String, bool, f32)>,
    mouse_mode: MouseMode,
    mouse_mode_history: Vec<MouseMode>,
    mouse_mask: u32,
    screenshot: Option<Vec<u8>>,
    event_pumps: u32,
}

/// Buildable in-memory scene tree that records every mutation.
pub struct MockSceneHost {
    state: Mutex<SceneState>,
}

impl MockSceneHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SceneState {
                nodes: Vec::new(),
                current_scene: None,
                changed_scene: None,
                reload_count: 0,
                paused: None,
                time_scale: None,
                injected: Vec::new(),
                actions: Vec::new(),
                mouse_mode: MouseMode::Visible,
                mouse_mode_history: Vec::new(),
                mouse_mask: 0,
                screenshot: None,
                event_pumps: 0,
            }),
        }
    }

    /// Add a node; `parent` of `None` makes it the root.
    pub fn add_node(
        &self,
        parent: Option<NodeId>,
        name: &str,
        class: &str,
        spatial: Option<NodeSpatial>,
    ) -> NodeId {
        let mut state = lock(&self.state);
        let path = match parent {
            None => format!("/{name}"),
            Some(parent) => {
                let parent_path = &state.nodes[parent.0 as usize - 1].path;
                format!("{parent_path}/{name}")
            }
        };
        state.nodes.push(MockNode {
            name: name.to_string(),
            path,
            class: class.to_string(),
            spatial,
            children: Vec::new(),
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
        });
        let index = state.nodes.len() - 1;
        if let Some(parent) = parent {
            state.nodes[parent.0 as usize - 1].children.push(index);
        }
        NodeId(index as u64 + 1)
    }

    pub fn set_node_property(&self, node: NodeId, property: &str, value: Value) {
        lock(&self.state).nodes[node.0 as usize - 1]
            .properties
            .insert(property.to_string(), value);
    }

    pub fn set_node_method(&self, node: NodeId, method: &str, result: Value) {
        lock(&self.state).nodes[node.0 as usize - 1]
            .methods
            .insert(method.to_string(), result);
    }

    pub fn set_current_scene(&self, path: Option<&str>) {
        lock(&self.state).current_scene = path.map(str::to_string);
    }

    pub fn set_screenshot(&self, png: Vec<u8>) {
        lock(&self.state).screenshot = Some(png);
    }

    pub fn set_initial_mouse_mode(&self, mode: MouseMode) {
        lock(&self.state).mouse_mode = mode;
    }

    pub fn injected(&self) -> Vec<InjectedInput> {
        lock(&self.state).injected.clone()
    }

    pub fn actions(&self) -> Vec<(String, bool, f32)> {
        lock(&self.state).actions.clone()
    }

    pub fn paused(&self) -> Option<bool> {
        lock(&self.state).paused
    }

    pub fn time_scale(&self) -> Option<f64> {
        lock(&self.state).time_scale
    }

    pub fn changed_scene(&self) -> Option<String> {
        lock(&self.state).changed_scene.clone()
    }

    pub fn reload_count(&self) -> u32 {
        lock(&self.state).reload_count
    }

    pub fn mouse_mode_history(&self) -> Vec<MouseMode> {
        lock(&self.state).mouse_mode_history.clone()
    }

    /// How many times the break loop pumped-and-dropped OS events.
    pub fn event_pumps(&self) -> u32 {
        lock(&self.state).event_pumps
    }
}

impl Default for MockSceneHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for MockSceneHost {
    fn root(&self) -> Option<NodeId> {
        if lock(&self.state).nodes.is_empty() {
            None
        } else {
            Some(NodeId(1))
        }
    }

    fn find(&self, path: &str) -> Option<NodeId> {
        lock(&self.state)
            .nodes
            .iter()
            .position(|node| node.path == path)
            .map(|index| NodeId(index as u64 + 1))
    }

    fn node_info(&self, node: NodeId) -> Option<NodeInfo> {
        let state = lock(&self.state);
        let node = state.nodes.get(node.0 as usize - 1)?;
        Some(NodeInfo {
            name: node.name.clone(),
            path: node.path.clone(),
            class: node.class.clone(),
            spatial: node.spatial,
        })
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let state = lock(&self.state);
        state
            .nodes
            .get(node.0 as usize - 1)
            .map(|node| {
                node.children
                    .iter()
                    .map(|index| NodeId(*index as u64 + 1))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_property(&self, node: NodeId, property: &str) -> Option<Value> {
        let state = lock(&self.state);
        state
            .nodes
            .get(node.0 as usize - 1)?
            .properties
            .get(property)
            .cloned()
    }

    fn set_property(&self, node: NodeId, property: &str, value: &Value) -> bool {
        let mut state = lock(&self.state);
        match state.nodes.get_mut(node.0 as usize - 1) {
            Some(node) => {
                node.properties.insert(property.to_string(), value.clone());
                true
            }
            None => false,
        }
    }

    fn has_method(&self, node: NodeId, method: &str) -> bool {
        let state = lock(&self.state);
        state
            .nodes
            .get(node.0 as usize - 1)
            .is_some_and(|node| node.methods.contains_key(method))
    }

    fn call_method(&self, node: NodeId, method: &str, _args: &[Value]) -> Option<Value> {
        let state = lock(&self.state);
        state
            .nodes
            .get(node.0 as usize - 1)?
            .methods
            .get(method)
            .cloned()
    }

    fn screenshot(&self, _node: Option<NodeId>) -> Option<Vec<u8>> {
        lock(&self.state).screenshot.clone()
    }

    fn current_scene(&self) -> Option<String> {
        lock(&self.state).current_scene.clone()
    }

    fn change_scene(&self, path: &str) -> bool {
        lock(&self.state).changed_scene = Some(path.to_string());
        true
    }

    fn reload_scene(&self) -> bool {
        lock(&self.state).reload_count += 1;
        true
    }

    fn set_pause(&self, paused: bool) {
        lock(&self.state).paused = Some(paused);
    }

    fn set_time_scale(&self, scale: f64) {
        lock(&self.state).time_scale = Some(scale);
    }

    fn feed_input(&self, event: InjectedInput) {
        lock(&self.state).injected.push(event);
    }

    fn action_press(&self, action: &str, strength: f32) {
        lock(&self.state)
            .actions
            .push((action.to_string(), true, strength));
    }

    fn action_release(&self, action: &str) {
        lock(&self.state)
            .actions
            .push((action.to_string(), false, 0.0));
    }

    fn mouse_button_mask(&self) -> u32 {
        lock(&self.state).mouse_mask
    }

    fn mouse_mode(&self) -> MouseMode {
        lock(&self.state).mouse_mode
    }

    fn set_mouse_mode(&self, mode: MouseMode) {
        let mut state = lock(&self.state);
        state.mouse_mode = mode;
        state.mouse_mode_history.push(mode);
    }

    fn process_and_drop_events(&self) {
        lock(&self.state).event_pumps += 1;
    }
}

// ============================================================================
// Performance monitors
// ============================================================================

struct MonitorState {
    built_in: Vec<Value>,
    custom: Vec<(String, Value)>,
    types: Vec<Value>,
    modification_time: u64,
}

/// Settable performance counters for profiler tests.
pub struct MockMonitors {
    state: Mutex<MonitorState>,
}

impl MockMonitors {
    pub fn new(built_in: Vec<Value>) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                built_in,
                custom: Vec::new(),
                types: Vec::new(),
                modification_time: 1,
            }),
        }
    }

    pub fn set_custom(&self, custom: Vec<(String, Value)>, types: Vec<Value>) {
        let mut state = lock(&self.state);
        state.custom = custom;
        state.types = types;
        state.modification_time += 1;
    }
}

impl crate::profiler::PerformanceMonitors for MockMonitors {
    fn monitor_count(&self) -> usize {
        lock(&self.state).built_in.len()
    }

    fn monitor(&self, index: usize) -> Value {
        lock(&self.state)
            .built_in
            .get(index)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    fn custom_monitor_names(&self) -> Vec<String> {
        lock(&self.state)
            .custom
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn custom_monitor_types(&self) -> Vec<Value> {
        lock(&self.state).types.clone()
    }

    fn custom_monitor(&self, name: &str) -> Value {
        lock(&self.state)
            .custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Nil)
    }

    fn monitor_modification_time(&self) -> u64 {
        lock(&self.state).modification_time
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock advanced explicitly by tests.
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for ManualClock {
    fn ticks_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}
