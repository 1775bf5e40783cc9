pub mod app;
pub mod config;
pub mod error;
pub mod fanout;
pub mod jobs;
pub mod middleware;
pub mod routes;
