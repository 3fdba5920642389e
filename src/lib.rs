pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod recorder;
pub mod routes;
pub mod storage;
