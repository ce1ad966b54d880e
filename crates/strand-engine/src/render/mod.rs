//! GPU rendering subsystem.
//!
//! One frame runs the moment shadow pass, the opaque pass (`platte`) and the
//! hair fragment lists (`ppll`) into an offscreen composite, which
//! `Presenter` then blits to the surface.
//!
//! Convention:
//! - World space is right-handed, y up.
//! - Sizes are physical pixels; the composite holds premultiplied alpha.

mod common;
mod ctx;
mod draw;
mod gpu_scene;
mod platte;
mod present;
mod targets;
mod wgsl;

pub mod msm;
pub mod ppll;
pub mod readback;

pub use ctx::{RenderCtx, RenderTarget};
pub use draw::Draw;
pub use gpu_scene::{GpuFibers, GpuMesh, GpuScene, SceneLayouts};
pub use platte::{Platte, PlatteParams};
pub use present::Presenter;
pub use targets::{CompositeTarget, TargetLayout};
