//! ragdb-text
//!
//! Tantivy-backed lexical channel: per-language analyzed chunk text, scoped by
//! workspace. `index` writes chunks, `search` implements
//! [`ragdb_core::traits::LexicalIndex`].

pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::TantivyChunkIndexer;
pub use search::{open_or_unavailable, TantivyLexicalIndex, UnavailableLexicalIndex};
