//! Time subsystem.
//!
//! One `FrameClock` per window; call `tick()` once per presented frame to
//! obtain `FrameTime`, which also carries the periodic FPS report.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
