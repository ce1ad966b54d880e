//! GPU device + surface management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue, windowed or headless
//! - creating & configuring the Surface (swapchain)
//! - acquiring frames and providing encoders/views for rendering
//! - checking resource sizes against device limits before allocation

mod gpu;
mod headless;
mod init;
pub mod limits;

pub use gpu::{Gpu, GpuFrame, SurfaceErrorAction};
pub use headless::HeadlessGpu;
pub use init::GpuInit;
