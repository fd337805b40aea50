mod fallback_policy;
mod realtime_store;
mod session_continuity;
mod snapshot_store;

pub use fallback_policy::*;
pub use realtime_store::*;
pub use session_continuity::*;
pub use snapshot_store::*;
