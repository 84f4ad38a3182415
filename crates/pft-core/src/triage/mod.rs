//! Per-session triage state machine.
//!
//! Transition rules live in [`transition::TABLE`]; [`machine::TriageMachine`]
//! validates events against the session, looks the pair up in the table and
//! applies side effects. Nothing here performs I/O.

pub mod event;
pub mod machine;
pub mod prompts;
pub mod state;
pub mod transition;

pub use event::{ChangeTarget, EventKind, Identity, TriageEvent};
pub use machine::{Transition, TriageMachine};
pub use state::{State, TriageSession};
