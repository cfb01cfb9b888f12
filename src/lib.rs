pub mod auth;
pub mod config;
pub mod db;
pub mod decision;
pub mod dispatcher;
pub mod documents;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod mailer;
pub mod models;
pub mod oracle;
pub mod reconciler;
pub mod routes;
pub mod schema;
pub mod signature;
pub mod state;
pub mod storage;
pub mod store;
pub mod utils;
pub mod vendors;
pub mod workers;

pub use workers::{default_handlers, Worker};
