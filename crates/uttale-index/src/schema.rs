use tantivy::schema::{
    FacetOptions, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED,
    STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::Index;

pub const TEXT_TOKENIZER: &str = "cue_text";

/// One indexed document per cue. `doc_id` is the stable external identity;
/// `scope` is a hierarchical facet so a scope filter also matches its
/// sub-scopes.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _doc_id_field = schema_builder.add_u64_field("doc_id", INDEXED | STORED | FAST);
    let _file_field = schema_builder.add_text_field("file", STRING | STORED);
    let _scope_field = schema_builder.add_facet_field("scope", FacetOptions::default());
    let _scope_text_field = schema_builder.add_text_field("scope_text", STRING | STORED);
    let _cue_index_field = schema_builder.add_u64_field("cue_index", STORED | FAST);
    let _start_field = schema_builder.add_f64_field("start", STORED);
    let _end_field = schema_builder.add_f64_field("end", STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TEXT_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default()
        .set_indexing_options(text_field_indexing)
        .set_stored();
    let _text_field = schema_builder.add_text_field("text", text_options);
    schema_builder.build()
}

/// Lowercasing simple tokenizer. No stop-word removal: cue search must match
/// exact short terms ("a", "the", "hello") case-insensitively.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TEXT_TOKENIZER, tokenizer);
}
