mod call_state;
mod peer_session;

pub use call_state::*;
pub use peer_session::*;
