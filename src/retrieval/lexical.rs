//! BM25 ranking over chunk text, backed by an in-RAM tantivy index

use crate::Result;
use std::fmt;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as TantivyValue, STORED,
    STRING,
};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, TokenStream, WhitespaceTokenizer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::models::DocumentChunk;

/// Lowercase + whitespace split, shared by chunks and queries
pub const CHUNK_TOKENIZER: &str = "whitespace_lower";

const WRITER_MEMORY_BYTES: usize = 50_000_000;

pub fn chunk_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(LowerCaser)
        .build()
}

/// Tokens exactly as the index sees them
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = chunk_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    stream.process(&mut |token| tokens.push(token.text.clone()));
    tokens
}

pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    text_field: Field,
    position_field: Field,
    len: usize,
}

impl fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalIndex").field("len", &self.len).finish()
    }
}

impl LexicalIndex {
    fn build_schema() -> (Schema, Field, Field, Field, Field) {
        let mut sb = Schema::builder();
        let id_field = sb.add_text_field("id", STRING | STORED);
        let source_field = sb.add_text_field("source", STRING | STORED);
        let position_field = sb.add_u64_field("position", STORED);

        let indexing = TextFieldIndexing::default()
            .set_tokenizer(CHUNK_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_field = sb.add_text_field("text", TextOptions::default().set_indexing_options(indexing));

        (sb.build(), id_field, source_field, text_field, position_field)
    }

    /// Index chunks in order; a chunk's position is its insertion ordinal
    pub fn build(chunks: &[DocumentChunk]) -> Result<Self> {
        let (schema, id_field, source_field, text_field, position_field) = Self::build_schema();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register(CHUNK_TOKENIZER, chunk_analyzer());

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        for (position, chunk) in chunks.iter().enumerate() {
            writer.add_document(doc!(
                id_field => chunk.id.as_str(),
                source_field => chunk.source.as_str(),
                position_field => position as u64,
                text_field => chunk.content.as_str(),
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            text_field,
            position_field,
            len: chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every chunk with a positive score as `(position, score)`,
    /// highest first, ties in insertion order
    pub fn score(&self, query: &str) -> Result<Vec<(usize, f64)>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
        let mut stream = analyzer.token_stream(query);
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        stream.process(&mut |token| {
            let term = Term::from_field_text(self.text_field, &token.text);
            let query: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
            clauses.push((Occur::Should, query));
        });
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(self.len))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            if score <= 0.0 {
                continue;
            }
            let stored: TantivyDocument = searcher.doc(address)?;
            if let Some(position) = stored.get_first(self.position_field).and_then(|v| v.as_u64()) {
                hits.push((position as usize, score as f64));
            }
        }

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }
}
