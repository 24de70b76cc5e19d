pub mod local;
pub mod remote;

pub use local::LocalDb;
pub use remote::{ServerStore, ServerTaskRecord};
