//! The component graph runtime.
//!
//! Three pieces, leaves-first: [`validator`] checks a candidate connection
//! list against the populated component sets before anything is built;
//! [`interrupter`] is the cooperative cancellation flag the scheduler polls;
//! [`scheduler`] owns the live graph — component instantiation, port
//! resolution (static and dynamic), and the `run`/`AGAIN`/`END`/error
//! execution loop.

pub mod interrupter;
pub mod scheduler;
pub mod validator;

pub use interrupter::Interrupter;
pub use scheduler::{Graph, GraphConfig, GraphError, RunStatus};
