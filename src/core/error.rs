use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::model::{CommentId, PostId, UserId};

/// Something the caller asked for by key that the catalog does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Post(PostId),
    User(UserId),
    Comment(CommentId),
    Title(String),
    Email(String),
    File(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(id) => write!(f, "post {}", id),
            Self::User(id) => write!(f, "user {}", id),
            Self::Comment(id) => write!(f, "comment {}", id),
            Self::Title(title) => write!(f, "post titled '{}'", title),
            Self::Email(email) => write!(f, "account registered with '{}'", email),
            Self::File(name) => write!(f, "file '{}'", name),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(Entity),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A user cannot follow or unfollow themselves")]
    SelfReference,

    #[error("{}:{line}: {reason}", file.display())]
    Malformed {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
