pub mod json_store;
pub mod lock;

pub use json_store::{OwnerState, Store};
pub use lock::OwnerLock;
