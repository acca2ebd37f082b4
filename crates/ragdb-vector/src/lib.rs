//! ragdb-vector
//!
//! LanceDB-backed dense channel and corpus store.
//!
//! - `schema`: Arrow schemas for the chunks, nodes and workspaces tables
//! - `table`: connection and table helpers
//! - `filter`: workspace-scoped SQL predicates
//! - `store`: [`LanceStore`], implementing `CorpusStore`
//! - `search`: `VectorIndex` for [`LanceStore`] (cosine kNN)
//! - `writer`: chunk, node and workspace upserts
//! - `node_backfill`: builds the node tier of a workspace

pub mod filter;
pub mod node_backfill;
pub mod schema;
pub mod search;
pub mod store;
pub mod table;
pub mod writer;

pub use node_backfill::{build_nodes, NodeBuildReport};
pub use store::LanceStore;
pub use table::TableNames;
pub use writer::LanceWriter;
