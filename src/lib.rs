pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod util;
