mod document_store;
mod memory_store;
mod signaling_channel;

pub use document_store::*;
pub use memory_store::*;
pub use signaling_channel::*;
