//! Monitor data models
//!
//! The persisted document is a single [`SessionState`] holding one
//! [`AgentRecord`] per tracked unit plus derived summary counts.

pub mod agent;
pub mod session;

pub use agent::{AgentKind, AgentRecord, CanonicalState, DisplayState};
pub use session::{document_schema, SessionState, Stats};
