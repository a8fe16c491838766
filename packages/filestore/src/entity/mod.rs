pub mod blob;
pub mod direct_link;
pub mod file;
pub mod file_blob;
pub mod metadata;
pub mod share;
pub mod storage_policy;
pub mod user;
