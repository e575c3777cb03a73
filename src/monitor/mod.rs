//! Viewer-facing side of the monitor
//!
//! - `overlay`: canonical state -> display state
//! - `broadcaster`: push/pull of decorated snapshots
//! - `staleness`: recurring re-evaluation of the overlay

mod broadcaster;
pub mod overlay;
mod staleness;

pub use broadcaster::{
    refresh_blocking, snapshot_blocking, subscribe_blocking, Broadcaster, Payload, Refresh,
    Subscription,
};
pub use overlay::DEFAULT_STALENESS_THRESHOLD;
pub use staleness::{StalenessMonitor, StalenessTicker, DEFAULT_TICK_INTERVAL};
