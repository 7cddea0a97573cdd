pub mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod server;

pub use db::Database;
pub use error::Error;
