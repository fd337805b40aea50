pub mod bus;
pub mod call;
pub mod config;
pub mod continuity;
pub mod error;
pub mod presence;
pub mod signaling;
pub mod transport;

pub use bus::*;
pub use call::*;
pub use config::*;
pub use continuity::*;
pub use error::*;
pub use presence::*;
pub use signaling::*;
pub use transport::*;
