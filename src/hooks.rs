//! Process-wide print and error hooks.
//!
//! The host runtime funnels every print and every reported error through
//! these registries. The agent installs itself at construction and is
//! removed again when dropped; entries hold [`Weak`] references so a
//! handler that went away is pruned instead of invoked.

use std::sync::{Mutex, MutexGuard, OnceLock, Weak};

use crate::marshal::ErrorKind;

/// Receives every line the runtime prints.
pub trait PrintHandler: Send + Sync {
    fn on_print(&self, text: &str, is_error: bool, is_rich: bool);
}

/// Receives every error and warning the runtime reports.
pub trait ErrorHandler: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn on_error(
        &self,
        func: &str,
        file: &str,
        line: u32,
        error: &str,
        description: &str,
        editor_notify: bool,
        kind: ErrorKind,
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn print_handlers() -> &'static Mutex<Vec<Weak<dyn PrintHandler>>> {
    static HANDLERS: OnceLock<Mutex<Vec<Weak<dyn PrintHandler>>>> = OnceLock::new();
    HANDLERS.get_or_init(|| Mutex::new(Vec::new()))
}

fn error_handlers() -> &'static Mutex<Vec<Weak<dyn ErrorHandler>>> {
    static HANDLERS: OnceLock<Mutex<Vec<Weak<dyn ErrorHandler>>>> = OnceLock::new();
    HANDLERS.get_or_init(|| Mutex::new(Vec::new()))
}

pub fn add_print_handler(handler: Weak<dyn PrintHandler>) {
    lock(print_handlers()).push(handler);
}

pub fn remove_print_handler(handler: &Weak<dyn PrintHandler>) {
    lock(print_handlers()).retain(|h| !h.ptr_eq(handler));
}

pub fn add_error_handler(handler: Weak<dyn ErrorHandler>) {
    lock(error_handlers()).push(handler);
}

pub fn remove_error_handler(handler: &Weak<dyn ErrorHandler>) {
    lock(error_handlers()).retain(|h| !h.ptr_eq(handler));
}

/// Called by the host's print path for every emitted line.
pub fn dispatch_print(text: &str, is_error: bool, is_rich: bool) {
    let handlers: Vec<_> = {
        let mut registered = lock(print_handlers());
        registered.retain(|h| h.strong_count() > 0);
        registered.iter().filter_map(Weak::upgrade).collect()
    };
    for handler in handlers {
        handler.on_print(text, is_error, is_rich);
    }
}

/// Called by the host's error reporting path.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_error(
    func: &str,
    file: &str,
    line: u32,
    error: &str,
    description: &str,
    editor_notify: bool,
    kind: ErrorKind,
) {
    let handlers: Vec<_> = {
        let mut registered = lock(error_handlers());
        registered.retain(|h| h.strong_count() > 0);
        registered.iter().filter_map(Weak::upgrade).collect()
    };
    for handler in handlers {
        handler.on_error(func, file, line, error, description, editor_notify, kind);
    }
}
