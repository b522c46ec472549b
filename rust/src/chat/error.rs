use estate_store_traits::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{field} must not be empty")]
    Validation { field: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed chat data: {0}")]
    Malformed(String),
}

impl ChatError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
