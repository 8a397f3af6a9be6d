pub mod corpus;
pub mod error;
pub mod index;
pub mod indexer;
pub mod metadata;
pub mod storage;
pub mod tokenizer;

pub use error::{Error, Result};
pub use index::{DocId, DocumentMetadata, DocumentRecord, IndexStats};
