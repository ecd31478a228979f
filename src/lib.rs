pub mod analytics;
pub mod config;
pub mod count;
pub mod models;
pub mod storage;
