//! State document persistence
//!
//! Handles the on-disk `state.json` shared by the ingest hook and the server:
//! - Atomic writes (temp file + rename)
//! - Tolerant reads with a last-known-good fallback
//! - Cheap freshness probes for polling

mod state_store;

pub use state_store::{Freshness, StateStore, StoreError};
