//! Long-running monitor process

pub mod http;
pub mod runtime;

pub use http::{router, AppState};
pub use runtime::{bind, run};
