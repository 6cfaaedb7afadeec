pub mod api;
pub mod config;
pub mod eth;
pub mod models;
pub mod resolver;
pub mod rpc;
pub mod scan_stats;
pub mod scanner;
