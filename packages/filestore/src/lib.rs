pub mod batch;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod policy;
pub mod quota;
pub mod relocate;
pub mod store;
pub mod tx;
pub mod validate;

pub use error::{ErrorKind, StoreError};
pub use store::{CreateFileParams, EntityParams, FileStore};
pub use tx::{Commit, Tx};
