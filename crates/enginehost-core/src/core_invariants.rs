//! Fatal checks for threading and state invariants of the bridge.
//!
//! A violation means host and engine state can no longer be trusted, so it panics instead of
//! returning an error. Keep this module free of dependencies.

use std::thread::{self, ThreadId};

#[cold]
#[inline(never)]
fn violation(msg: &str) -> ! {
    panic!("bridge invariant violated: {msg}");
}

#[inline]
pub fn require(cond: bool, msg: &'static str) {
    if !cond {
        violation(msg);
    }
}

/// The caller must be `owner`. An unbound owner (`None`) also fails.
#[inline]
pub fn require_thread(owner: Option<ThreadId>, msg: &'static str) {
    if owner != Some(thread::current().id()) {
        let current = thread::current();
        violation(&format!(
            "{msg} (on thread {:?})",
            current.name().unwrap_or("<unnamed>")
        ));
    }
}

/// Unreachable lifecycle state.
#[inline]
pub fn bad_state(msg: &'static str) -> ! {
    violation(msg)
}
