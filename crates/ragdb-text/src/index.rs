use anyhow::{bail, Result};
use std::path::Path;
use tantivy::{doc, Index, IndexWriter, Term};

use ragdb_core::language::LexicalLanguage;
use ragdb_core::types::{Chunk, WorkspaceId};

use crate::tantivy_utils::{build_schema, chunk_key, register_tokenizers, ChunkFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Writes chunk text into the lexical index, one document per chunk.
pub struct TantivyChunkIndexer {
	index: Index,
	fields: ChunkFields,
}

impl TantivyChunkIndexer {
	/// Opens the index under `index_dir`, creating it on first use.
	pub fn open_or_create(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir)?;
		let index = if index_dir.join("meta.json").exists() {
			Index::open_in_dir(index_dir)?
		} else {
			tracing::info!(dir = %index_dir.display(), "creating tantivy index");
			Index::create_in_dir(index_dir, build_schema())?
		};
		Self::from_index(index)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizers(&index);
		let fields = ChunkFields::resolve(&index.schema())?;
		Ok(Self { index, fields })
	}

	pub fn index(&self) -> &Index {
		&self.index
	}

	/// Upserts `chunks` of one workspace, analyzed for `language`.
	///
	/// A chunk already indexed under the same workspace and id is replaced.
	pub fn index_chunks(&self, workspace: &WorkspaceId, language: LexicalLanguage, chunks: &[Chunk]) -> Result<usize> {
		if let Some(stray) = chunks.iter().find(|c| c.workspace_id != *workspace) {
			bail!("chunk {} belongs to workspace {}, not {}", stray.id, stray.workspace_id, workspace);
		}
		let text_field = self.fields.text(language);
		let mut index_writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
		for c in chunks {
			let key = chunk_key(workspace.as_str(), &c.id);
			index_writer.delete_term(Term::from_field_text(self.fields.chunk_key, &key));
			index_writer.add_document(doc!(
				self.fields.chunk_key => key,
				self.fields.chunk_id => c.id.clone(),
				self.fields.workspace_id => workspace.as_str(),
				self.fields.doc_id => c.document_id.clone(),
				self.fields.chunk_index => c.chunk_index as u64,
				text_field => c.content.clone(),
			))?;
		}
		index_writer.commit()?;
		tracing::debug!(%workspace, %language, chunks = chunks.len(), "indexed chunks");
		Ok(chunks.len())
	}

	/// Removes every chunk of `workspace`.
	pub fn delete_workspace(&self, workspace: &WorkspaceId) -> Result<()> {
		let mut index_writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
		index_writer.delete_term(Term::from_field_text(self.fields.workspace_id, workspace.as_str()));
		index_writer.commit()?;
		Ok(())
	}
}
