//! Per-thread inbound message demux.
//!
//! Inbound frames name the thread they are addressed to. A thread owns an
//! inbox while it can act on commands: the main thread always, any other
//! thread only while parked inside [`RemoteProbe::debug`]. Frames for
//! threads without an inbox are discarded; the tool learns a thread id
//! from `debug_enter` and loses it at `debug_exit`.

use tracing::trace;

use super::{current_thread_id, lock_shared, ProbeThreadId, RemoteProbe};
use crate::value::Value;

/// One demultiplexed inbound command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub verb: String,
    pub payload: Vec<Value>,
}

impl RemoteProbe {
    /// Pull every pending frame from the peer and sort it into per-thread
    /// inboxes. Malformed frames and frames for absent threads vanish.
    pub(crate) fn poll_messages(&self) {
        let mut shared = lock_shared(self);

        self.peer.poll();
        while self.peer.has_message() {
            let Some(frame) = self.peer.get_message() else {
                break;
            };
            if frame.len() != 3 {
                trace!(len = frame.len(), "discarding malformed inbound frame");
                continue;
            }
            let (verb, origin, payload) = (&frame[0], &frame[1], &frame[2]);
            let (Some(verb), Some(origin), Some(payload)) =
                (verb.as_str(), origin.as_int(), payload.as_array())
            else {
                trace!("discarding inbound frame with wrong element types");
                continue;
            };
            if origin < 0 {
                trace!(origin, "discarding inbound frame with negative thread id");
                continue;
            }

            let thread = ProbeThreadId(origin as u64);
            if let Some(queue) = shared.inboxes.get_mut(&thread) {
                queue.push_back(Command {
                    verb: verb.to_string(),
                    payload: payload.to_vec(),
                });
            }
            // No inbox: that thread is not around to receive commands.
        }
    }

    /// Whether the calling thread's inbox has a command waiting.
    pub(crate) fn has_messages(&self) -> bool {
        let shared = lock_shared(self);
        shared
            .inboxes
            .get(&current_thread_id())
            .is_some_and(|queue| !queue.is_empty())
    }

    /// Pop the next command addressed to the calling thread.
    pub(crate) fn next_message(&self) -> Option<Command> {
        let mut shared = lock_shared(self);
        shared.inboxes.get_mut(&current_thread_id())?.pop_front()
    }

    pub(crate) fn insert_inbox(&self, thread: ProbeThreadId) {
        let mut shared = lock_shared(self);
        shared.inboxes.entry(thread).or_default();
    }

    pub(crate) fn remove_inbox(&self, thread: ProbeThreadId) {
        let mut shared = lock_shared(self);
        shared.inboxes.remove(&thread);
    }
}
