use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const WORKSPACE_ID: &str = "workspace_id";
pub const DOCUMENT_ID: &str = "document_id";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const CONTENT: &str = "content";
pub const NODE_INDEX: &str = "node_index";
pub const SPAN_START: &str = "span_start";
pub const SPAN_END: &str = "span_end";
pub const TEXT: &str = "text";
pub const LANGUAGE: &str = "language";
pub const VECTOR: &str = "vector";
pub const DISTANCE: &str = "_distance";

fn vector_field(dim: i32) -> Field {
	Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(WORKSPACE_ID, DataType::Utf8, false),
		Field::new(DOCUMENT_ID, DataType::Utf8, false),
		Field::new(CHUNK_INDEX, DataType::Int32, false),
		Field::new(CONTENT, DataType::Utf8, false),
		vector_field(dim),
	]))
}

pub fn build_nodes_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(WORKSPACE_ID, DataType::Utf8, false),
		Field::new(DOCUMENT_ID, DataType::Utf8, false),
		Field::new(NODE_INDEX, DataType::Int32, false),
		Field::new(SPAN_START, DataType::Int32, false),
		Field::new(SPAN_END, DataType::Int32, false),
		Field::new(TEXT, DataType::Utf8, false),
		vector_field(dim),
	]))
}

pub fn build_workspaces_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(LANGUAGE, DataType::Utf8, false),
	]))
}
