pub mod config;
pub mod kinds;
pub mod policy_flags;
pub mod storage;
pub mod storage_diff;

pub use kinds::{EntityType, FileType, PolicyType};
pub use policy_flags::PolicyFlags;
pub use storage_diff::StorageDiff;
