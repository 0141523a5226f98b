pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod jsonl;
pub mod models;
pub mod notify;
pub mod registry;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod store;
pub mod workers;

pub use workers::{default_handlers, Worker};
