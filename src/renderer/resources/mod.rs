/// "Resources" are GPU objects created through the device and owned by the user.
/// Each one releases its Vulkan handles on drop.

pub mod attachment;
pub mod buffer;
pub mod descriptors;
pub mod framebuffer;
pub mod image;
pub mod mesh;
pub mod pipeline;
pub mod sampler;
pub mod shader;
pub mod vertex;
