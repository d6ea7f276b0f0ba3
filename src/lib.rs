pub mod abi;
pub mod app;
pub mod config;
pub mod decode;
pub mod domain;
pub mod error;
pub mod export;
pub mod metadata;
pub mod output;
pub mod quotes;
pub mod rpc;
pub mod store;
