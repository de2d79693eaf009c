//! Threaded runtime for the `cop1-rs` FOP-1 engine.
//!
//! Two single-threaded cooperative workers carry one engine instance per
//! virtual channel: the engine worker owns all protocol state, the
//! lower-layer worker owns the (possibly blocking) call into the output
//! sink. A dedicated one-shot timer worker posts epoch-stamped expiries back
//! onto the engine worker.

mod engine;
mod shim;
mod timer;

pub use engine::{Cop1Engine, ObserverId, SharedObserver};
