pub mod mock_joiner;
pub mod mock_media;
pub mod mock_peer;
pub mod mock_store;

pub use mock_joiner::*;
pub use mock_media::*;
pub use mock_peer::*;
pub use mock_store::*;
