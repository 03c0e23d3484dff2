//! Services shared by the server and the CLI

mod database;

pub use database::DatabaseService;
