pub mod config;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod strategy;
pub mod tracker;
pub mod utils;
