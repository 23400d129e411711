pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod query;
pub mod storage;
pub mod tsv;
pub mod upload;
