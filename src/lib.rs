//! Vulkan frame execution: device setup, GPU resources, render-pass graphs,
//! swapchain pacing and the per-frame caller contract.

pub mod renderer;

pub use renderer::config::RenderConfig;
pub use renderer::window::{RenderWindow, WinitWindow};
pub use renderer::{FrameContext, Renderer};
