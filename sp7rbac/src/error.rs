#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Builder Error: missing {0}")]
    Builder(&'static str),
    #[error("tool {tool} references unknown table {table}")]
    UnknownTable {
        tool: String,
        table: String,
    },
    #[error("invalid resource: {0:?}")]
    InvalidResource(String),
    #[error("policy catalog mismatch; expected {expected}, fetched {fetched}")]
    CatalogMismatch {
        expected: String,
        fetched: String,
    },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
