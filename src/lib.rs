pub mod config;
pub mod driver;
pub mod error;
pub mod server;
pub mod storage;

pub use config::Config;
pub use driver::{DriverHandler, DriverOptions, StorageFormat};
pub use error::{DbError, DbResult};
pub use server::DriverServer;
pub use storage::StorageEngine;
