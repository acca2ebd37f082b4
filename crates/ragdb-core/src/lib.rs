//! ragdb-core
//!
//! Domain types, error type, configuration and the storage contracts shared
//! by the retrieval engine (`ragdb-hybrid`) and its adapters (`ragdb-text`,
//! `ragdb-vector`, `ragdb-embed`).
#![deny(dead_code)]
#![deny(unused_variables)]

pub mod config;
pub mod error;
pub mod language;
pub mod memory;
pub mod nodes;
pub mod similarity;
pub mod traits;
pub mod types;
