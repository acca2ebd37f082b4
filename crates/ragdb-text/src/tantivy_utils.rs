use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use ragdb_core::language::LexicalLanguage;

pub const CHUNK_KEY: &str = "chunk_key";
pub const CHUNK_ID: &str = "chunk_id";
pub const WORKSPACE_ID: &str = "workspace_id";
pub const DOC_ID: &str = "doc_id";
pub const CHUNK_INDEX: &str = "chunk_index";

/// Field and tokenizer name for one language, e.g. `text_english`.
pub fn text_field_name(language: LexicalLanguage) -> String {
	format!("text_{}", language.tag())
}

/// Unique per workspace; chunk ids alone may collide across tenants.
pub fn chunk_key(workspace: &str, chunk_id: &str) -> String {
	format!("{workspace}\u{1f}{chunk_id}")
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field(CHUNK_KEY, STRING);
	schema_builder.add_text_field(CHUNK_ID, STRING | STORED);
	schema_builder.add_text_field(WORKSPACE_ID, STRING | STORED);
	schema_builder.add_text_field(DOC_ID, STRING | STORED);
	schema_builder.add_u64_field(CHUNK_INDEX, STORED);
	for language in LexicalLanguage::SUPPORTED {
		let name = text_field_name(language);
		let indexing = TextFieldIndexing::default()
			.set_tokenizer(&name)
			.set_index_option(IndexRecordOption::WithFreqsAndPositions);
		schema_builder.add_text_field(&name, TextOptions::default().set_indexing_options(indexing));
	}
	schema_builder.build()
}

fn stemmer_language(language: LexicalLanguage) -> Language {
	match language {
		LexicalLanguage::English => Language::English,
		LexicalLanguage::German => Language::German,
		LexicalLanguage::French => Language::French,
	}
}

/// Registers one analyzer per language: lowercase, stop words, stemming.
/// Must run on every opened index before reading or writing.
pub fn register_tokenizers(index: &Index) {
	for language in LexicalLanguage::SUPPORTED {
		let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(language.stop_words().iter().map(|s| (*s).to_string())))
			.filter(Stemmer::new(stemmer_language(language)))
			.build();
		index.tokenizers().register(&text_field_name(language), analyzer);
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub chunk_key: Field,
	pub chunk_id: Field,
	pub workspace_id: Field,
	pub doc_id: Field,
	pub chunk_index: Field,
	english: Field,
	german: Field,
	french: Field,
}

impl ChunkFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			chunk_key: schema.get_field(CHUNK_KEY)?,
			chunk_id: schema.get_field(CHUNK_ID)?,
			workspace_id: schema.get_field(WORKSPACE_ID)?,
			doc_id: schema.get_field(DOC_ID)?,
			chunk_index: schema.get_field(CHUNK_INDEX)?,
			english: schema.get_field(&text_field_name(LexicalLanguage::English))?,
			german: schema.get_field(&text_field_name(LexicalLanguage::German))?,
			french: schema.get_field(&text_field_name(LexicalLanguage::French))?,
		})
	}

	pub fn text(&self, language: LexicalLanguage) -> Field {
		match language {
			LexicalLanguage::English => self.english,
			LexicalLanguage::German => self.german,
			LexicalLanguage::French => self.french,
		}
	}
}
