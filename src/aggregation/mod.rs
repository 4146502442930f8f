//! In-memory aggregation of StatsD updates.
//!
//! - `store`: the locked, ordered map of per-key aggregate state
//! - `flush`: the periodic emit-and-reset cycle

pub mod flush;
pub mod store;

pub use flush::{flush, FlushStats};
pub use store::{FlushAction, MetricRecord, MetricStore};
