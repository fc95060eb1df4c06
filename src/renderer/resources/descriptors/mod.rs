pub mod layout;
pub mod pool;
pub mod writer;

pub use layout::{BindingDesc, DescriptorSetLayout, LayoutBindings};
pub use pool::DescriptorPool;
pub use writer::DescriptorWriter;
