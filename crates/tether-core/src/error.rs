use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("User is already a member of this group")]
    AlreadyMember,
    #[error("not a member of this group")]
    NotAMember,
    #[error("only the group admin can do that")]
    NotAdmin,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Message safe to send back to the originating connection. Store and
    /// internal failures are reported generically so implementation detail
    /// never leaks to the client.
    pub fn client_message(&self) -> String {
        match self {
            CoreError::Store(_) | CoreError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
