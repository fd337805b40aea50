mod input;
mod position_store;
mod presence_engine;
mod roster;

pub use input::*;
pub use position_store::*;
pub use presence_engine::*;
pub use roster::*;
