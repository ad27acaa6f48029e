pub mod app;
pub mod binaries;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod output;
pub mod pixels;
pub mod policy;
pub mod pyramids;
pub mod request;
pub mod store;
pub mod used_files;
