//! Order-independent transparency with per-pixel linked lists.
//!
//! The store pass appends every hair fragment in front of the opaque depth to
//! its pixel's list; the blend pass sorts the nearest fragments and composites
//! them over the opaque layer.

pub mod arena;
pub mod resolve;

mod engine;

pub use arena::{FragmentNode, SENTINEL};
pub use engine::{BlendParams, PpllEngine, StoreParams};
