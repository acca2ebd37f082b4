use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use ragdb_core::error::{Error, Result};
use ragdb_core::language::LexicalLanguage;
use ragdb_core::traits::LexicalIndex;
use ragdb_core::types::{Channel, IndexMatch, WorkspaceId};

use crate::tantivy_utils::{register_tokenizers, ChunkFields};

/// BM25 lookup over one language field, restricted to a workspace.
#[derive(Clone)]
pub struct TantivyLexicalIndex {
	index: Index,
	reader: IndexReader,
	fields: ChunkFields,
}

impl TantivyLexicalIndex {
	pub fn open(index_dir: &Path) -> anyhow::Result<Self> {
		Self::from_index(Index::open_in_dir(index_dir)?)
	}

	pub fn from_index(index: Index) -> anyhow::Result<Self> {
		register_tokenizers(&index);
		let fields = ChunkFields::resolve(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields })
	}

	/// Picks up commits made since the reader was opened.
	pub fn reload(&self) -> anyhow::Result<()> {
		self.reader.reload()?;
		Ok(())
	}

	/// Query terms as the index analyzed them for `language`, deduplicated.
	fn analyze(&self, query: &str, language: LexicalLanguage) -> tantivy::Result<Vec<String>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text(language))?;
		let mut stream = analyzer.token_stream(query);
		let mut terms = Vec::new();
		stream.process(&mut |token| terms.push(token.text.clone()));
		terms.sort();
		terms.dedup();
		Ok(terms)
	}

	fn search_blocking(&self, workspace: &str, query: &str, language: LexicalLanguage, top_k: usize) -> tantivy::Result<Vec<IndexMatch>> {
		let terms = self.analyze(query, language)?;
		if terms.is_empty() || top_k == 0 {
			return Ok(Vec::new());
		}
		let text_field = self.fields.text(language);
		let any_term: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(text_field, t), IndexRecordOption::WithFreqs));
				(Occur::Should, q)
			})
			.collect();
		let scope = TermQuery::new(Term::from_field_text(self.fields.workspace_id, workspace), IndexRecordOption::Basic);
		let query = BooleanQuery::new(vec![
			(Occur::Must, Box::new(BooleanQuery::new(any_term)) as Box<dyn Query>),
			(Occur::Must, Box::new(ConstScoreQuery::new(Box::new(scope), 0.0)) as Box<dyn Query>),
		]);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(top_k))?;
		let mut matches = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(id) = doc.get_first(self.fields.chunk_id).and_then(|v| v.as_str()) else {
				tracing::warn!(?addr, "lexical hit without chunk id, skipping");
				continue;
			};
			let document_id = doc.get_first(self.fields.doc_id).and_then(|v| v.as_str()).unwrap_or_default();
			let chunk_index = doc.get_first(self.fields.chunk_index).and_then(|v| v.as_u64()).and_then(|i| usize::try_from(i).ok());
			matches.push(IndexMatch { id: id.to_string(), document_id: document_id.to_string(), chunk_index, score });
		}
		Ok(matches)
	}
}

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
	async fn search(&self, workspace: &WorkspaceId, query: &str, language: LexicalLanguage, top_k: usize) -> Result<Vec<IndexMatch>> {
		let this = self.clone();
		let workspace = workspace.as_str().to_string();
		let query = query.to_string();
		tokio::task::spawn_blocking(move || this.search_blocking(&workspace, &query, language, top_k))
			.await
			.map_err(|e| Error::unavailable(Channel::Lexical, e))?
			.map_err(|e| Error::unavailable(Channel::Lexical, e))
	}
}

/// Stands in for an index that could not be opened; every search reports the
/// lexical channel as unavailable so retrieval degrades to dense.
#[derive(Debug, Clone)]
pub struct UnavailableLexicalIndex {
	reason: String,
}

impl UnavailableLexicalIndex {
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

#[async_trait]
impl LexicalIndex for UnavailableLexicalIndex {
	async fn search(&self, _workspace: &WorkspaceId, _query: &str, _language: LexicalLanguage, _top_k: usize) -> Result<Vec<IndexMatch>> {
		Err(Error::unavailable(Channel::Lexical, &self.reason))
	}
}

/// Opens the index at `index_dir`, or an [`UnavailableLexicalIndex`] when it
/// cannot be opened.
pub fn open_or_unavailable(index_dir: &Path) -> Arc<dyn LexicalIndex> {
	match TantivyLexicalIndex::open(index_dir) {
		Ok(index) => Arc::new(index),
		Err(e) => {
			tracing::warn!(dir = %index_dir.display(), error = %e, "lexical index unavailable, hybrid queries will degrade");
			Arc::new(UnavailableLexicalIndex::new(format!("cannot open {}: {e}", index_dir.display())))
		}
	}
}
