//! The in-process store: posts, users, comments, likes and the follow graph.
//!
//! A `Catalog` is an owned value. Servers wrap it in a mutex inside their
//! shared state; tests build one directly. Any change that alters the
//! keyword corpus bumps [`Catalog::version`], which is what the similarity
//! engine keys its cache on.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{CatalogError, CatalogResult, Entity};
use super::model::{
    Comment, CommentId, CommentLike, FileInfo, Like, NewPost, NewUser, Post, PostId, Profile,
    ProfileUpdate, User, UserId,
};
use super::query::{parse_post_date, SearchFilters, SortOrder};

#[derive(Debug, Default)]
pub struct Catalog {
    pub(crate) posts: Vec<Post>,
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) comments: Vec<Comment>,
    pub(crate) likes: BTreeSet<Like>,
    pub(crate) comment_likes: BTreeSet<CommentLike>,
    pub(crate) downloads: BTreeMap<String, u64>,
    /// Per-post likes that have no like records behind them
    pub(crate) legacy_likes: BTreeMap<PostId, u64>,
    pub(crate) version: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corpus version; changes whenever a post is added.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn post(&self, id: PostId) -> CatalogResult<&Post> {
        self.posts
            .iter()
            .find(|p| p.id == id)
            .ok_or(CatalogError::NotFound(Entity::Post(id)))
    }

    /// First post whose title matches exactly.
    pub fn post_by_title(&self, title: &str) -> CatalogResult<&Post> {
        self.posts
            .iter()
            .find(|p| p.title == title)
            .ok_or_else(|| CatalogError::NotFound(Entity::Title(title.to_string())))
    }

    pub fn user(&self, id: UserId) -> CatalogResult<&User> {
        self.users
            .get(&id)
            .ok_or(CatalogError::NotFound(Entity::User(id)))
    }

    pub fn user_by_name(&self, name: &str) -> Option<&User> {
        self.users.values().find(|u| u.name == name)
    }

    /// Login lookup. There are no credentials; an email identifies an account.
    pub fn find_user_by_email(&self, email: &str) -> CatalogResult<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .ok_or_else(|| CatalogError::NotFound(Entity::Email(email.to_string())))
    }

    pub fn comments_for(&self, post_id: PostId) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.post_id == post_id).collect()
    }

    // ===== Posts =====

    /// Store a new post and return its identifier (one past the highest in use).
    pub fn create_post(&mut self, new: NewPost) -> CatalogResult<PostId> {
        if new.title.trim().is_empty() {
            return Err(CatalogError::invalid("post title is required"));
        }
        if new.author.trim().is_empty() {
            return Err(CatalogError::invalid("post author is required"));
        }

        let id = self
            .posts
            .iter()
            .map(|p| p.id)
            .max()
            .unwrap_or_default()
            .next();

        self.posts.push(Post {
            id,
            title: new.title,
            description: new.description,
            keywords: new.keywords,
            metadata: new.metadata,
            filename: new.filename,
            author: new.author,
            date: new.date,
            likes: 0,
        });
        self.touch();

        Ok(id)
    }

    /// Substring search with filters and ordering.
    ///
    /// A post matches when the lowercased query occurs in its title,
    /// description, joined keywords or any of its comments, or equals the
    /// extension of its attached file. An empty query matches every post.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        sort: SortOrder,
    ) -> CatalogResult<Vec<&Post>> {
        let filters = filters.validate()?;
        let needle = query.to_lowercase();

        let mut comments_by_post: HashMap<PostId, Vec<&str>> = HashMap::new();
        for comment in &self.comments {
            comments_by_post
                .entry(comment.post_id)
                .or_default()
                .push(&comment.text);
        }

        let department = filters.department.as_ref().map(|d| d.to_lowercase());
        let user = filters.user.as_ref().map(|u| u.to_lowercase());

        let mut results: Vec<&Post> = self
            .posts
            .iter()
            .filter(|post| {
                let comments = comments_by_post.get(&post.id);
                post.title.to_lowercase().contains(&needle)
                    || post.description.to_lowercase().contains(&needle)
                    || post.joined_keywords().to_lowercase().contains(&needle)
                    || comments.map_or(false, |texts| {
                        texts.iter().any(|t| t.to_lowercase().contains(&needle))
                    })
                    || post.file_extension().map_or(false, |ext| ext == needle)
            })
            .filter(|post| filters.date_in_range(post.date.as_deref()))
            .filter(|post| {
                filters.file_type.as_ref().map_or(true, |suffix| {
                    post.filename.as_ref().map_or(false, |f| f.ends_with(suffix.as_str()))
                })
            })
            .filter(|post| {
                department.as_ref().map_or(true, |dept| {
                    self.user_by_name(&post.author)
                        .map_or(false, |u| u.department.to_lowercase() == *dept)
                })
            })
            .filter(|post| {
                user.as_ref()
                    .map_or(true, |name| post.author.to_lowercase().contains(name.as_str()))
            })
            .collect();

        // Vec::sort_by_key is stable, so ties keep insertion order
        match sort {
            SortOrder::Popularity => results.sort_by_key(|p| Reverse(p.likes)),
            SortOrder::Comments => results.sort_by_key(|p| {
                Reverse(comments_by_post.get(&p.id).map_or(0, |c| c.len()))
            }),
            SortOrder::Date => {
                results.sort_by_key(|p| Reverse(p.date.as_deref().and_then(parse_post_date)))
            }
        }

        Ok(results)
    }

    /// Record a like. Returns `false` when this user already liked the post.
    pub fn toggle_like(&mut self, post_id: PostId, user_id: UserId) -> CatalogResult<bool> {
        self.user(user_id)?;
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(CatalogError::NotFound(Entity::Post(post_id)))?;

        if !self.likes.insert(Like { post_id, user_id }) {
            return Ok(false);
        }
        post.likes += 1;
        Ok(true)
    }

    pub fn add_comment(
        &mut self,
        post_id: PostId,
        user_id: UserId,
        text: &str,
    ) -> CatalogResult<CommentId> {
        self.post(post_id)?;
        self.user(user_id)?;

        let id = self
            .comments
            .iter()
            .map(|c| c.id)
            .max()
            .unwrap_or_default()
            .next();
        self.comments.push(Comment {
            id,
            post_id,
            author: user_id,
            text: text.to_string(),
            likes: 0,
        });
        Ok(id)
    }

    pub fn like_comment(&mut self, comment_id: CommentId, user_id: UserId) -> CatalogResult<bool> {
        self.user(user_id)?;
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or(CatalogError::NotFound(Entity::Comment(comment_id)))?;

        if !self.comment_likes.insert(CommentLike {
            comment_id,
            user_id,
        }) {
            return Ok(false);
        }
        comment.likes += 1;
        Ok(true)
    }

    // ===== Users =====

    pub fn register_user(&mut self, new: NewUser) -> CatalogResult<UserId> {
        if new.name.trim().is_empty() {
            return Err(CatalogError::invalid("name is required"));
        }
        if new.email.trim().is_empty() {
            return Err(CatalogError::invalid("email is required"));
        }
        if self.find_user_by_email(&new.email).is_ok() {
            return Err(CatalogError::invalid(format!(
                "an account is already registered with '{}'",
                new.email
            )));
        }

        let id = UserId(self.users.len() as u64).next();
        // Ids from a loaded file may be sparse; never reuse one
        let id = if self.users.contains_key(&id) {
            self.users.keys().max().copied().unwrap_or_default().next()
        } else {
            id
        };

        self.users.insert(
            id,
            User {
                id,
                name: new.name,
                job_title: new.job_title,
                email: new.email,
                department: new.department,
                profile_picture: new.profile_picture,
                bio: new.bio,
                research_interests: new.research_interests,
                website: new.website,
                followers: BTreeSet::new(),
                following: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    /// Apply a profile edit. Renaming also renames the author of the
    /// user's posts, since posts record their author by name.
    pub fn update_profile(&mut self, id: UserId, update: ProfileUpdate) -> CatalogResult<&User> {
        if let Some(email) = &update.email {
            if let Ok(other) = self.find_user_by_email(email) {
                if other.id != id {
                    return Err(CatalogError::invalid(format!(
                        "an account is already registered with '{}'",
                        email
                    )));
                }
            }
        }

        let user = self
            .users
            .get_mut(&id)
            .ok_or(CatalogError::NotFound(Entity::User(id)))?;
        let old_name = user.name.clone();

        if let Some(v) = update.name.filter(|n| !n.trim().is_empty()) {
            user.name = v;
        }
        if let Some(v) = update.job_title {
            user.job_title = v;
        }
        if let Some(v) = update.email {
            user.email = v;
        }
        if let Some(v) = update.department {
            user.department = v;
        }
        if let Some(v) = update.profile_picture {
            user.profile_picture = Some(v);
        }
        if let Some(v) = update.bio {
            user.bio = v;
        }
        if let Some(v) = update.research_interests {
            user.research_interests = v;
        }
        if let Some(v) = update.website {
            user.website = v;
        }

        let new_name = user.name.clone();
        if new_name != old_name {
            for post in self.posts.iter_mut().filter(|p| p.author == old_name) {
                post.author = new_name.clone();
            }
        }

        self.user(id)
    }

    /// Users whose name or department contains the query, ignoring case.
    pub fn search_users(&self, query: &str) -> Vec<&User> {
        let needle = query.to_lowercase();
        self.users
            .values()
            .filter(|u| {
                u.name.to_lowercase().contains(&needle)
                    || u.department.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn profile(&self, id: UserId) -> CatalogResult<Profile> {
        let user = self.user(id)?;
        let posts = self
            .posts
            .iter()
            .filter(|p| p.author == user.name)
            .cloned()
            .collect();
        let liked_posts = self
            .posts
            .iter()
            .filter(|p| self.likes.contains(&Like { post_id: p.id, user_id: id }))
            .cloned()
            .collect();

        Ok(Profile {
            user: user.clone(),
            posts,
            liked_posts,
        })
    }

    /// Add `follower → target` to the graph. Returns `false` when the
    /// relation already existed. Rejections leave the graph untouched.
    pub fn follow(&mut self, follower: UserId, target: UserId) -> CatalogResult<bool> {
        if follower == target {
            return Err(CatalogError::SelfReference);
        }
        self.user(follower)?;
        self.user(target)?;

        let mut added = false;
        if let Some(user) = self.users.get_mut(&follower) {
            added = user.following.insert(target);
        }
        if let Some(user) = self.users.get_mut(&target) {
            user.followers.insert(follower);
        }
        Ok(added)
    }

    /// Remove `follower → target`. Removing an absent relation is a no-op
    /// that returns `false`.
    pub fn unfollow(&mut self, follower: UserId, target: UserId) -> CatalogResult<bool> {
        if follower == target {
            return Err(CatalogError::SelfReference);
        }
        self.user(follower)?;
        self.user(target)?;

        let mut removed = false;
        if let Some(user) = self.users.get_mut(&follower) {
            removed = user.following.remove(&target);
        }
        if let Some(user) = self.users.get_mut(&target) {
            user.followers.remove(&follower);
        }
        Ok(removed)
    }

    // ===== Files =====

    /// Count a download and return the new total for that file.
    pub fn record_download(&mut self, filename: &str) -> u64 {
        let count = self.downloads.entry(filename.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn download_count(&self, filename: &str) -> u64 {
        self.downloads.get(filename).copied().unwrap_or(0)
    }

    pub fn file_info(&self, uploads_dir: &Path, filename: &str) -> CatalogResult<FileInfo> {
        let path = uploads_dir.join(filename);
        let metadata = std::fs::metadata(&path)
            .map_err(|_| CatalogError::NotFound(Entity::File(filename.to_string())))?;
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        Ok(FileInfo {
            filename: filename.to_string(),
            size_bytes: metadata.len(),
            extension,
            downloads: self.download_count(filename),
        })
    }

    /// SHA-256 over every post's id, title and keywords. Identical corpora
    /// produce identical fingerprints across processes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for post in &self.posts {
            hasher.update(post.id.0.to_le_bytes());
            hasher.update(post.title.as_bytes());
            hasher.update([0u8]);
            for keyword in &post.keywords {
                hasher.update(keyword.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}
