//! Goal-driven remote browser orchestration.
//!
//! Given a natural-language goal, the operator opens a remote browser session,
//! asks a planning service for one step at a time, executes each step against
//! the session and stops when the planner or executor signals completion.
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, step history,
//!   display projection). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP clients, config, on-disk state).
//!   Clients sit behind traits so tests can script them.
//!
//! [`session_loop`] drives the state machine with the clients and publishes
//! snapshots for observers.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session_loop;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
