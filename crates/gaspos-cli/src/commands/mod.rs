pub mod common;
pub mod recover;
pub mod reset;
pub mod status;
pub mod stock;
pub mod sync;
pub mod tables;
