/// "Internals" are low-level helpers used to implement the "Resources" objects.

pub mod barrier;
pub mod swapchain;
