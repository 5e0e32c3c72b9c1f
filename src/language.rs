//! Script language adapter seam.
//!
//! The agent never touches the script VM directly. Breakpoint storage,
//! stepping state, stack introspection and expression evaluation all go
//! through this trait, implemented by the host's scripting layer.
//!
//! Implementations are called from whichever thread the VM runs on and
//! must do their own locking.

use thiserror::Error;

use crate::marshal::StackFrame;
use crate::value::Value;

/// Failure modes of [`ScriptDebugger::evaluate`]
#[derive(Debug, Clone, Error)]
pub enum EvaluateError {
    /// The expression did not parse
    #[error("parse error: {0}")]
    Parse(String),

    /// The expression parsed but execution failed
    #[error("execution error: {0}")]
    Execution(String),
}

/// A named global object exposed by the runtime's class system.
#[derive(Debug, Clone)]
pub struct NativeSingleton {
    pub name: String,
    /// Whether the class is exposed to scripts at all.
    pub exposed: bool,
    /// Editor-only singletons are hidden from game-side evaluation.
    pub editor_only: bool,
    pub object: Value,
}

/// A script class registered globally by name.
#[derive(Debug, Clone)]
pub struct GlobalScriptClass {
    pub name: String,
    pub path: String,
}

/// Host scripting layer as seen by the agent.
pub trait ScriptDebugger: Send + Sync {
    // Breakpoints and break policy.
    fn insert_breakpoint(&self, source: &str, line: u32);
    fn remove_breakpoint(&self, source: &str, line: u32);
    fn set_skip_breakpoints(&self, skip: bool);
    fn is_skipping_breakpoints(&self) -> bool;
    fn set_ignore_error_breaks(&self, ignore: bool);
    fn is_ignoring_error_breaks(&self) -> bool;

    // Stepping state consumed by the VM when a break loop returns.
    fn set_depth(&self, depth: i32);
    fn set_lines_left(&self, lines: i32);

    /// Ask the VM to stop at the next statement and call back into
    /// [`RemoteProbe::debug`](crate::RemoteProbe::debug).
    fn request_break(&self);

    // State of the broken VM.
    fn current_error(&self) -> String;
    /// Stack of the thread currently reporting an error, outermost last.
    fn current_stack(&self) -> Vec<StackFrame>;
    fn stack_depth(&self) -> usize;
    fn frame_info(&self, level: usize) -> Option<StackFrame>;
    /// Owner object of the script instance at `level`, if the frame has one.
    fn frame_instance_owner(&self, level: usize) -> Option<Value>;
    fn frame_members(&self, level: usize) -> Vec<(String, Value)>;
    fn frame_locals(&self, level: usize) -> Vec<(String, Value)>;
    fn globals(&self) -> Vec<(String, Value)>;

    // Evaluation environment.
    fn native_singletons(&self) -> Vec<NativeSingleton>;
    fn global_script_classes(&self) -> Vec<GlobalScriptClass>;
    /// Load a script resource by path so it can be named in expressions.
    fn load_script(&self, path: &str) -> Option<Value>;
    /// Parse and execute `expression` with `inputs` bound by name, `base`
    /// as the implicit self.
    fn evaluate(
        &self,
        expression: &str,
        inputs: &[(String, Value)],
        base: Option<&Value>,
    ) -> Result<Value, EvaluateError>;

    // Deferred reloads, executed from the idle pump.
    fn reload_scripts(&self, paths: &[String]);
    fn reload_all_scripts(&self);
}
