//! Catalog records: posts, users, comments and the like/follow relations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

id_type!(PostId);
id_type!(UserId);
id_type!(CommentId);

/// Domain metadata describing the dataset behind a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetMetadata {
    pub dataset_type: Option<String>,
    pub collection_period: Option<String>,
    pub organism: Option<String>,
    pub genes: Option<String>,
    pub tissue_cell_type: Option<String>,
    pub condition: Option<String>,
    pub technique: Option<String>,
    pub instrument_platform: Option<String>,
    pub software: Option<String>,
    pub usage_restrictions: Option<String>,
    pub related_datasets: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub metadata: DatasetMetadata,
    pub filename: Option<String>,
    /// Author display name, as stored in the `User` column.
    pub author: String,
    pub date: Option<String>,
    pub likes: u64,
}

impl Post {
    pub fn joined_keywords(&self) -> String {
        self.keywords.join(" ")
    }

    /// Lowercased extension of the attached file, if any.
    pub fn file_extension(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        let (_, ext) = filename.rsplit_once('.')?;
        Some(ext.to_lowercase())
    }
}

/// Fields accepted when creating a post. Identifier, like count and
/// storage-level details are assigned by the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub metadata: DatasetMetadata,
    pub filename: Option<String>,
    pub author: String,
    pub date: Option<String>,
}

impl NewPost {
    /// Split a free-text keyword field into tokens.
    pub fn parse_keywords(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(String::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub job_title: String,
    pub email: String,
    pub department: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub research_interests: String,
    pub website: String,
    pub followers: BTreeSet<UserId>,
    pub following: BTreeSet<UserId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewUser {
    pub name: String,
    pub job_title: String,
    pub email: String,
    pub department: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub research_interests: String,
    pub website: String,
}

/// Partial profile edit; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub research_interests: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: UserId,
    pub text: String,
    pub likes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Like {
    pub post_id: PostId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommentLike {
    pub comment_id: CommentId,
    pub user_id: UserId,
}

/// A user together with what they posted and what they liked.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub posts: Vec<Post>,
    pub liked_posts: Vec<Post>,
}

/// Size, extension and download count of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub extension: String,
    pub downloads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension_lowercased() {
        let post = Post {
            id: PostId(1),
            title: "Atlas".to_string(),
            description: String::new(),
            keywords: vec![],
            metadata: DatasetMetadata::default(),
            filename: Some("counts.Matrix.CSV".to_string()),
            author: "Ada".to_string(),
            date: None,
            likes: 0,
        };
        assert_eq!(post.file_extension().as_deref(), Some("csv"));
    }

    #[test]
    fn test_parse_keywords_skips_blank_runs() {
        assert_eq!(
            NewPost::parse_keywords("  rna-seq   mouse\tliver "),
            vec!["rna-seq", "mouse", "liver"]
        );
    }
}
