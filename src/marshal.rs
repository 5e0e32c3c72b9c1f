//! Wire payload shapes shared with the debugger tool.
//!
//! These structs define the payload layout of the agent's outbound
//! messages. The tool side decodes with the mirror of the same layout, so
//! the element order here is part of the protocol.

use crate::value::Value;

/// Kind of a forwarded output line. Wire integers are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Log = 0,
    Error = 1,
    LogRich = 2,
}

impl OutputKind {
    pub fn to_value(self) -> Value {
        Value::Int(self as i64)
    }

    pub fn from_int(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Log),
            1 => Some(Self::Error),
            2 => Some(Self::LogRich),
            _ => None,
        }
    }
}

/// Severity of a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    Warning,
}

/// One script stack level as reported by the language adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub func: String,
}

/// Time of day derived from monotonic milliseconds since process start.
///
/// `hr` is not wall-clock and grows without wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub hr: u64,
    pub min: u8,
    pub sec: u8,
    pub msec: u16,
}

impl Timestamp {
    pub fn from_ticks_ms(ticks: u64) -> Self {
        Self {
            hr: ticks / 3_600_000,
            min: ((ticks / 60_000) % 60) as u8,
            sec: ((ticks / 1_000) % 60) as u8,
            msec: (ticks % 1_000) as u16,
        }
    }
}

/// A structured error or warning forwarded over the `error` verb.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub func: String,
    pub file: String,
    pub line: u32,
    pub error: String,
    pub description: String,
    pub warning: bool,
    pub timestamp: Timestamp,
    pub editor_notify: bool,
    pub callstack: Vec<StackFrame>,
}

impl ErrorRecord {
    /// Flatten to the `error` payload:
    /// `[hr, min, sec, msec, func, file, line, error, description, warning,
    /// editor_notify, frame_count, (file, line, func)*]`.
    pub fn serialize(&self) -> Vec<Value> {
        let mut out = vec![
            Value::Int(self.timestamp.hr as i64),
            Value::Int(self.timestamp.min as i64),
            Value::Int(self.timestamp.sec as i64),
            Value::Int(self.timestamp.msec as i64),
            Value::Str(self.func.clone()),
            Value::Str(self.file.clone()),
            Value::Int(self.line as i64),
            Value::Str(self.error.clone()),
            Value::Str(self.description.clone()),
            Value::Bool(self.warning),
            Value::Bool(self.editor_notify),
            Value::Int(self.callstack.len() as i64),
        ];
        for frame in &self.callstack {
            out.push(Value::Str(frame.file.clone()));
            out.push(Value::Int(frame.line as i64));
            out.push(Value::Str(frame.func.clone()));
        }
        out
    }

    /// Inverse of [`serialize`](Self::serialize); used by tool-side decoding
    /// and round-trip tests.
    pub fn deserialize(payload: &[Value]) -> Option<Self> {
        if payload.len() < 12 {
            return None;
        }
        let frame_count = payload[11].as_int()? as usize;
        if payload.len() < 12 + frame_count * 3 {
            return None;
        }
        let mut callstack = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            let base = 12 + i * 3;
            callstack.push(StackFrame {
                file: payload[base].as_str()?.to_string(),
                line: payload[base + 1].as_int()? as u32,
                func: payload[base + 2].as_str()?.to_string(),
            });
        }
        Some(Self {
            timestamp: Timestamp {
                hr: payload[0].as_int()? as u64,
                min: payload[1].as_int()? as u8,
                sec: payload[2].as_int()? as u8,
                msec: payload[3].as_int()? as u16,
            },
            func: payload[4].as_str()?.to_string(),
            file: payload[5].as_str()?.to_string(),
            line: payload[6].as_int()? as u32,
            error: payload[7].as_str()?.to_string(),
            description: payload[8].as_str()?.to_string(),
            warning: payload[9].as_bool()?,
            editor_notify: payload[10].as_bool()?,
            callstack,
        })
    }
}

/// Classification of a variable sent in response to stack inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local = 0,
    Member = 1,
    Global = 2,
    Evaluation = 3,
}

/// One variable forwarded over `stack_frame_var` or `evaluation_return`.
#[derive(Debug, Clone, PartialEq)]
pub struct StackVariable {
    pub name: String,
    pub kind: VarKind,
    pub value: Value,
}

impl StackVariable {
    /// Payload shape: `[name, kind, value]`.
    pub fn serialize(&self) -> Vec<Value> {
        vec![
            Value::Str(self.name.clone()),
            Value::Int(self.kind as i64),
            self.value.clone(),
        ]
    }
}

/// Serialize stack frames for the `stack_dump` payload: one dict per frame
/// with `file`, `line` and `function` keys.
pub fn serialize_stack_dump(frames: &[StackFrame]) -> Vec<Value> {
    frames
        .iter()
        .map(|frame| {
            let mut dict = std::collections::BTreeMap::new();
            dict.insert("file".to_string(), Value::Str(frame.file.clone()));
            dict.insert("line".to_string(), Value::Int(frame.line as i64));
            dict.insert("function".to_string(), Value::Str(frame.func.clone()));
            Value::Dict(dict)
        })
        .collect()
}
