use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no source data for document {document_id}")]
    NotFound { document_id: String },
    #[error("backend unreachable: {0}")]
    Connectivity(String),
    #[error("invalid document id {0:?}")]
    InvalidDocumentId(String),
    #[error("invalid term {0:?}")]
    InvalidTerm(String),
    #[error("key-value store error: {0}")]
    Kv(#[from] sled::Error),
    #[error("relational store error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transaction aborted: {0}")]
    Transaction(String),
}

impl Error {
    pub fn not_found(document_id: impl Into<String>) -> Self {
        Error::NotFound { document_id: document_id.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
