//! SQL predicates for LanceDB `only_if` filters.
//!
//! Every predicate built here starts from the workspace clause, so no query
//! can run unscoped.

use ragdb_core::types::{SpanFilter, WorkspaceId};

use crate::schema::{CHUNK_INDEX, DOCUMENT_ID, ID, SPAN_END, SPAN_START, WORKSPACE_ID};

/// Single-quoted SQL string literal with embedded quotes doubled.
pub fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

pub fn workspace(ws: &WorkspaceId) -> String {
	format!("{WORKSPACE_ID} = {}", quote(ws.as_str()))
}

pub fn ids_in(ws: &WorkspaceId, ids: &[String]) -> String {
	let list = ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ");
	format!("{} AND {ID} IN ({list})", workspace(ws))
}

pub fn documents_in(ws: &WorkspaceId, document_ids: &[String]) -> String {
	let list = document_ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ");
	format!("{} AND {DOCUMENT_ID} IN ({list})", workspace(ws))
}

pub fn document(ws: &WorkspaceId, document_id: &str) -> String {
	format!("{} AND {DOCUMENT_ID} = {}", workspace(ws), quote(document_id))
}

/// Chunk rows whose index lies inside one of the spans.
pub fn chunk_spans(ws: &WorkspaceId, filter: &SpanFilter) -> String {
	let clauses = filter
		.spans()
		.iter()
		.map(|s| format!("({DOCUMENT_ID} = {} AND {CHUNK_INDEX} >= {} AND {CHUNK_INDEX} <= {})", quote(&s.document_id), s.span.start, s.span.end))
		.collect::<Vec<_>>();
	scoped_any(ws, &clauses)
}

/// Node rows whose span intersects one of the spans.
pub fn node_spans(ws: &WorkspaceId, filter: &SpanFilter) -> String {
	let clauses = filter
		.spans()
		.iter()
		.map(|s| format!("({DOCUMENT_ID} = {} AND {SPAN_START} <= {} AND {SPAN_END} >= {})", quote(&s.document_id), s.span.end, s.span.start))
		.collect::<Vec<_>>();
	scoped_any(ws, &clauses)
}

fn scoped_any(ws: &WorkspaceId, clauses: &[String]) -> String {
	if clauses.is_empty() {
		// An empty filter selects nothing.
		return format!("{} AND FALSE", workspace(ws));
	}
	format!("{} AND ({})", workspace(ws), clauses.join(" OR "))
}
