pub mod upload_store;
pub mod user_locks;

pub use upload_store::*;
pub use user_locks::*;
