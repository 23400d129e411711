use std::path::{Path, PathBuf};

pub const POSTS_FILE: &str = "posts.tsv";
pub const USERS_FILE: &str = "users.tsv";

pub struct DataPaths {
    pub root: PathBuf,
    pub posts: PathBuf,
    pub users: PathBuf,
    pub comments: PathBuf,
    pub likes: PathBuf,
    pub comment_likes: PathBuf,
    pub follows: PathBuf,
    pub downloads: PathBuf,
    pub config: PathBuf,
    pub index_db: PathBuf,
}

impl DataPaths {
    pub fn new() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        let index_db = root.join(".datashare").join("index.db");
        Self {
            posts: root.join(POSTS_FILE),
            users: root.join(USERS_FILE),
            comments: root.join("comments.tsv"),
            likes: root.join("likes.tsv"),
            comment_likes: root.join("comment_likes.tsv"),
            follows: root.join("follows.tsv"),
            downloads: root.join("downloads.tsv"),
            config: root.join("datashare.yaml"),
            index_db,
            root,
        }
    }

    /// Resolve the uploads directory from its configured (possibly relative) name.
    pub fn uploads(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }

    pub fn data_files(&self) -> Vec<(&PathBuf, &str)> {
        vec![
            (&self.posts, "Posts"),
            (&self.users, "Users"),
            (&self.comments, "Comments"),
            (&self.likes, "Post likes"),
            (&self.comment_likes, "Comment likes"),
            (&self.follows, "Follow graph"),
            (&self.downloads, "Download counters"),
        ]
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new()
    }
}
