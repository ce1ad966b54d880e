//! Strand engine crate.
//!
//! Hair fibers and opaque geometry rendered with per-pixel linked-list
//! transparency and moment shadow maps, plus the platform and GPU runtime
//! pieces the studio binary is built on.

pub mod device;
pub mod window;
pub mod input;
pub mod time;
pub mod core;

pub mod logging;
pub mod config;
pub mod camera;
pub mod scene;
pub mod render;
