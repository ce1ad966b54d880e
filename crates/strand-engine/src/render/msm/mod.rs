//! Moment shadow maps.
//!
//! The light renders four optimized depth moments per texel, a separable
//! Gaussian blurs them, and consumers reconstruct soft visibility with the
//! Hamburger four-moment estimator.

pub mod filter;
pub mod moments;

mod generator;
mod light;

pub use generator::{FilterParams, ShadowGenerator, ShadowMap, ShadowParams};
pub use light::LightFrame;
