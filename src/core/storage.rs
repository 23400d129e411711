//! Flat-file persistence for the catalog.
//!
//! `posts.tsv` and `users.tsv` keep the column layout the board has always
//! used; comments, likes, follows and download counters live in their own
//! small tables next to them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::warn;

use super::catalog::Catalog;
use super::error::{CatalogError, CatalogResult};
use super::model::{
    Comment, CommentId, CommentLike, DatasetMetadata, Like, Post, PostId, User, UserId,
};
use super::paths::DataPaths;
use super::tsv::{write_atomic, Record, Table};

pub const POST_ID_COLUMN: &str = "Post ID";
/// Likes carried over from a posts file that predates `likes.tsv`
pub const LEGACY_LIKES_COLUMN: &str = "Legacy Likes";

pub const POST_COLUMNS: &[&str] = &[
    "Title",
    "Description",
    "Keywords",
    "Dataset Type",
    "Collection Period",
    "Organism",
    "Genes",
    "Tissue/Cell Type",
    "Condition",
    "Technique",
    "Instrument Platform",
    "Software",
    "Usage Restrictions",
    "Related Datasets",
    "Link",
    "Filename",
    "User",
    POST_ID_COLUMN,
    "Likes",
    "Date",
    LEGACY_LIKES_COLUMN,
];

pub const USER_COLUMNS: &[&str] = &[
    "Name",
    "Job Title",
    "Email",
    "Department",
    "Profile Picture",
    "Bio",
    "Research Interests",
    "Website",
    "User ID",
];

const COMMENT_COLUMNS: &[&str] = &["Comment ID", "Post ID", "User ID", "Text", "Likes"];
const LIKE_COLUMNS: &[&str] = &["Post ID", "User ID"];
const COMMENT_LIKE_COLUMNS: &[&str] = &["Comment ID", "User ID"];
const FOLLOW_COLUMNS: &[&str] = &["Follower ID", "Following ID"];
const DOWNLOAD_COLUMNS: &[&str] = &["Filename", "Count"];

/// Read a table, treating a missing file as absent.
fn read_optional(path: &Path) -> CatalogResult<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    Table::read(path).map(Some)
}

fn parse_id<T: std::str::FromStr>(record: &Record<'_>, column: &str, file: &Path) -> CatalogResult<T> {
    record.get(column).parse().map_err(|_| CatalogError::Malformed {
        file: file.to_path_buf(),
        line: record.line,
        reason: format!("'{}' is not a valid {}", record.get(column), column),
    })
}

fn parse_count(record: &Record<'_>, column: &str) -> u64 {
    record.get(column).trim().parse().unwrap_or(0)
}

impl Catalog {
    /// Load every table under `paths`. Missing files read as empty.
    pub fn load(paths: &DataPaths) -> CatalogResult<Self> {
        let mut catalog = Catalog::new();

        if let Some(table) = read_optional(&paths.users)? {
            for (row, record) in table.records().enumerate() {
                let id = if record.get("User ID").trim().is_empty() {
                    UserId(row as u64 + 1)
                } else {
                    parse_id(&record, "User ID", &paths.users)?
                };
                if catalog.users.contains_key(&id) {
                    return Err(duplicate(&paths.users, record.line, "User ID", id));
                }
                catalog.users.insert(id, user_from_record(id, &record));
            }
        }

        let mut legacy_likes = BTreeMap::new();
        if let Some(table) = read_optional(&paths.posts)? {
            (catalog.posts, legacy_likes) = posts_from_table(&table, &paths.posts)?;
        }

        if let Some(table) = read_optional(&paths.comments)? {
            for record in table.records() {
                catalog.comments.push(Comment {
                    id: parse_id(&record, "Comment ID", &paths.comments)?,
                    post_id: parse_id(&record, "Post ID", &paths.comments)?,
                    author: parse_id(&record, "User ID", &paths.comments)?,
                    text: record.get("Text").to_string(),
                    likes: parse_count(&record, "Likes"),
                });
            }
        }

        // With likes.tsv present a post has its Legacy Likes baseline plus
        // one per like record. Without it the Likes column is all there is,
        // and it becomes the baseline kept across later saves.
        if let Some(table) = read_optional(&paths.likes)? {
            for record in table.records() {
                catalog.likes.insert(Like {
                    post_id: parse_id(&record, "Post ID", &paths.likes)?,
                    user_id: parse_id(&record, "User ID", &paths.likes)?,
                });
            }
            let mut counts: BTreeMap<PostId, u64> = BTreeMap::new();
            for like in &catalog.likes {
                *counts.entry(like.post_id).or_insert(0) += 1;
            }
            for post in &mut catalog.posts {
                let baseline = legacy_likes.get(&post.id).copied().unwrap_or(0);
                post.likes = baseline + counts.get(&post.id).copied().unwrap_or(0);
            }
            legacy_likes.retain(|_, n| *n > 0);
            catalog.legacy_likes = legacy_likes;
        } else {
            catalog.legacy_likes = catalog
                .posts
                .iter()
                .filter(|p| p.likes > 0)
                .map(|p| (p.id, p.likes))
                .collect();
        }

        if let Some(table) = read_optional(&paths.comment_likes)? {
            for record in table.records() {
                catalog.comment_likes.insert(CommentLike {
                    comment_id: parse_id(&record, "Comment ID", &paths.comment_likes)?,
                    user_id: parse_id(&record, "User ID", &paths.comment_likes)?,
                });
            }
            let mut counts: BTreeMap<CommentId, u64> = BTreeMap::new();
            for like in &catalog.comment_likes {
                *counts.entry(like.comment_id).or_insert(0) += 1;
            }
            for comment in &mut catalog.comments {
                comment.likes = counts.get(&comment.id).copied().unwrap_or(0);
            }
        }

        if let Some(table) = read_optional(&paths.follows)? {
            for record in table.records() {
                let follower: UserId = parse_id(&record, "Follower ID", &paths.follows)?;
                let target: UserId = parse_id(&record, "Following ID", &paths.follows)?;
                if let Err(e) = catalog.follow(follower, target) {
                    warn!(line = record.line, "Skipping follow {} -> {}: {}", follower, target, e);
                }
            }
        }

        if let Some(table) = read_optional(&paths.downloads)? {
            for record in table.records() {
                catalog
                    .downloads
                    .insert(record.get("Filename").to_string(), parse_count(&record, "Count"));
            }
        }

        catalog.touch();
        Ok(catalog)
    }

    /// Write every table under `paths`.
    pub fn save(&self, paths: &DataPaths) -> CatalogResult<()> {
        let mut posts = Table::new(POST_COLUMNS);
        for post in &self.posts {
            let legacy = self.legacy_likes.get(&post.id).copied().unwrap_or(0);
            posts.push(post_to_row(post, legacy));
        }
        posts.write(&paths.posts)?;

        let mut users = Table::new(USER_COLUMNS);
        for user in self.users.values() {
            users.push(vec![
                user.name.clone(),
                user.job_title.clone(),
                user.email.clone(),
                user.department.clone(),
                user.profile_picture.clone().unwrap_or_default(),
                user.bio.clone(),
                user.research_interests.clone(),
                user.website.clone(),
                user.id.to_string(),
            ]);
        }
        users.write(&paths.users)?;

        let mut comments = Table::new(COMMENT_COLUMNS);
        for c in &self.comments {
            comments.push(vec![
                c.id.to_string(),
                c.post_id.to_string(),
                c.author.to_string(),
                c.text.clone(),
                c.likes.to_string(),
            ]);
        }
        comments.write(&paths.comments)?;

        let mut likes = Table::new(LIKE_COLUMNS);
        for like in &self.likes {
            likes.push(vec![like.post_id.to_string(), like.user_id.to_string()]);
        }
        likes.write(&paths.likes)?;

        let mut comment_likes = Table::new(COMMENT_LIKE_COLUMNS);
        for like in &self.comment_likes {
            comment_likes.push(vec![like.comment_id.to_string(), like.user_id.to_string()]);
        }
        comment_likes.write(&paths.comment_likes)?;

        let mut follows = Table::new(FOLLOW_COLUMNS);
        for user in self.users.values() {
            for target in &user.following {
                follows.push(vec![user.id.to_string(), target.to_string()]);
            }
        }
        follows.write(&paths.follows)?;

        let mut downloads = Table::new(DOWNLOAD_COLUMNS);
        for (filename, count) in &self.downloads {
            downloads.push(vec![filename.clone(), count.to_string()]);
        }
        downloads.write(&paths.downloads)?;

        Ok(())
    }
}

fn duplicate(file: &Path, line: usize, column: &str, id: impl std::fmt::Display) -> CatalogError {
    CatalogError::Malformed {
        file: file.to_path_buf(),
        line,
        reason: format!(
            "duplicate {} {} (run `datashare renumber` to repair post ids)",
            column, id
        ),
    }
}

/// Posts in row order, plus each post's Legacy Likes baseline.
fn posts_from_table(
    table: &Table,
    file: &Path,
) -> CatalogResult<(Vec<Post>, BTreeMap<PostId, u64>)> {
    let mut posts: Vec<Post> = Vec::with_capacity(table.rows.len());
    let mut legacy: Vec<u64> = Vec::with_capacity(table.rows.len());
    let mut seen: BTreeSet<PostId> = BTreeSet::new();
    let mut unnumbered = Vec::new();

    for record in table.records() {
        let id = if record.get(POST_ID_COLUMN).trim().is_empty() {
            unnumbered.push(posts.len());
            PostId(0)
        } else {
            let id: PostId = parse_id(&record, POST_ID_COLUMN, file)?;
            if !seen.insert(id) {
                return Err(duplicate(file, record.line, POST_ID_COLUMN, id));
            }
            id
        };

        let metadata = DatasetMetadata {
            dataset_type: record.optional("Dataset Type"),
            collection_period: record.optional("Collection Period"),
            organism: record.optional("Organism"),
            genes: record.optional("Genes"),
            tissue_cell_type: record.optional("Tissue/Cell Type"),
            condition: record.optional("Condition"),
            technique: record.optional("Technique"),
            instrument_platform: record.optional("Instrument Platform"),
            software: record.optional("Software"),
            usage_restrictions: record.optional("Usage Restrictions"),
            related_datasets: record.optional("Related Datasets"),
            link: record.optional("Link"),
        };

        posts.push(Post {
            id,
            title: record.get("Title").to_string(),
            description: record.get("Description").to_string(),
            keywords: record
                .get("Keywords")
                .split_whitespace()
                .map(String::from)
                .collect(),
            metadata,
            filename: record.optional("Filename"),
            author: record.get("User").to_string(),
            date: record.optional("Date"),
            likes: parse_count(&record, "Likes"),
        });
        legacy.push(parse_count(&record, LEGACY_LIKES_COLUMN));
    }

    // Rows without an id get fresh ones after the highest in use
    let mut next = seen.iter().max().copied().unwrap_or_default();
    for idx in unnumbered {
        next = next.next();
        posts[idx].id = next;
    }

    let baselines = posts.iter().map(|p| p.id).zip(legacy).collect();
    Ok((posts, baselines))
}

fn post_to_row(post: &Post, legacy_likes: u64) -> Vec<String> {
    let m = &post.metadata;
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        post.title.clone(),
        post.description.clone(),
        post.joined_keywords(),
        opt(&m.dataset_type),
        opt(&m.collection_period),
        opt(&m.organism),
        opt(&m.genes),
        opt(&m.tissue_cell_type),
        opt(&m.condition),
        opt(&m.technique),
        opt(&m.instrument_platform),
        opt(&m.software),
        opt(&m.usage_restrictions),
        opt(&m.related_datasets),
        opt(&m.link),
        opt(&post.filename),
        post.author.clone(),
        post.id.to_string(),
        post.likes.to_string(),
        opt(&post.date),
        legacy_likes.to_string(),
    ]
}

fn user_from_record(id: UserId, record: &Record<'_>) -> User {
    User {
        id,
        name: record.get("Name").to_string(),
        job_title: record.get("Job Title").to_string(),
        email: record.get("Email").to_string(),
        department: record.get("Department").to_string(),
        profile_picture: record.optional("Profile Picture"),
        bio: record.get("Bio").to_string(),
        research_interests: record.get("Research Interests").to_string(),
        website: record.get("Website").to_string(),
        followers: BTreeSet::new(),
        following: BTreeSet::new(),
    }
}

/// Outcome of renumbering a posts file.
#[derive(Debug, Default)]
pub struct Renumbering {
    pub rows: usize,
    /// Old id to new id. When an old id appears on several rows the first
    /// row keeps the related records.
    pub ids: BTreeMap<PostId, PostId>,
}

/// Rewrite the Post ID column of a posts file as 1..N in row order,
/// adding the column when it is missing. Lines are edited in place: only
/// the Post ID cell changes, every other byte is kept.
pub fn renumber_posts(path: &Path) -> CatalogResult<Renumbering> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.split_inclusive('\n');

    let header = lines.next().filter(|l| !l.trim().is_empty()).ok_or_else(|| {
        CatalogError::Malformed {
            file: path.to_path_buf(),
            line: 1,
            reason: "missing header row".to_string(),
        }
    })?;
    let (header_body, header_end) = split_line_end(header);
    let existing = header_body
        .split('\t')
        .position(|h| h.trim() == POST_ID_COLUMN);

    let mut out = String::with_capacity(content.len() + 16);
    let column = match existing {
        Some(idx) => {
            out.push_str(header);
            idx
        }
        None => {
            out.push_str(header_body);
            out.push('\t');
            out.push_str(POST_ID_COLUMN);
            out.push_str(if header_end.is_empty() { "\n" } else { header_end });
            header_body.split('\t').count()
        }
    };

    let mut result = Renumbering::default();
    for line in lines {
        let (body, end) = split_line_end(line);
        if body.is_empty() {
            out.push_str(line);
            continue;
        }
        result.rows += 1;
        let new_id = PostId(result.rows as u64);
        let id = new_id.to_string();

        let mut cells: Vec<&str> = body.split('\t').collect();
        if existing.is_some() {
            if let Some(old) = cells.get(column).and_then(|c| c.trim().parse::<PostId>().ok()) {
                result.ids.entry(old).or_insert(new_id);
            }
        }
        if cells.len() <= column {
            cells.resize(column + 1, "");
        }
        cells[column] = &id;

        out.push_str(&cells.join("\t"));
        out.push_str(if end.is_empty() { "\n" } else { end });
    }

    write_atomic(path, &out)?;
    Ok(result)
}

/// Renumber the data directory's posts and move comments and like records
/// to the new ids. Records whose post id no longer maps to a row are
/// dropped. Returns the renumbering and the number of dropped records.
pub fn renumber_catalog(paths: &DataPaths) -> CatalogResult<(Renumbering, usize)> {
    let renumbering = renumber_posts(&paths.posts)?;
    let mut dropped = 0;
    for table in [&paths.comments, &paths.likes] {
        dropped += remap_post_ids(table, &renumbering.ids)?;
    }
    Ok((renumbering, dropped))
}

fn remap_post_ids(path: &Path, ids: &BTreeMap<PostId, PostId>) -> CatalogResult<usize> {
    let Some(mut table) = read_optional(path)? else {
        return Ok(0);
    };
    let Some(column) = table.column(POST_ID_COLUMN) else {
        return Ok(0);
    };

    let before = table.rows.len();
    table.retain_rows(|row| {
        match row[column].trim().parse::<PostId>().ok().and_then(|old| ids.get(&old)) {
            Some(new) => {
                row[column] = new.to_string();
                true
            }
            None => {
                warn!(file = %path.display(), "Dropping record for unknown post '{}'", row[column]);
                false
            }
        }
    });
    let dropped = before - table.rows.len();
    table.write(path)?;
    Ok(dropped)
}

fn split_line_end(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::tests::{post, user};
    use std::fs;

    #[test]
    fn test_save_then_load_preserves_state() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let paths = DataPaths::from_root(dir.path().to_path_buf());

        let mut catalog = Catalog::new();
        let ada = catalog.register_user(user("Ada", "Genomics"))?;
        let bo = catalog.register_user(user("Bo", "Imaging"))?;
        let mut p = post("Liver\tAtlas", "rna-seq mouse", "Ada");
        p.description = "line one\nline two".to_string();
        p.metadata.organism = Some("Mus musculus".to_string());
        p.date = Some("2024-03-01".to_string());
        let id = catalog.create_post(p)?;
        catalog.toggle_like(id, bo)?;
        let c = catalog.add_comment(id, bo, "nice")?;
        catalog.like_comment(c, ada)?;
        catalog.follow(bo, ada)?;
        catalog.record_download("atlas.csv");
        catalog.save(&paths)?;

        let loaded = Catalog::load(&paths)?;
        assert_eq!(loaded.posts(), catalog.posts());
        assert_eq!(loaded.comments(), catalog.comments());
        assert_eq!(
            loaded.users().cloned().collect::<Vec<_>>(),
            catalog.users().cloned().collect::<Vec<_>>()
        );
        assert_eq!(loaded.download_count("atlas.csv"), 1);
        assert_eq!(loaded.like_count(), 1);
        Ok(())
    }

    #[test]
    fn test_load_legacy_posts_file() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let paths = DataPaths::from_root(dir.path().to_path_buf());
        fs::write(
            &paths.posts,
            "Title\tDescription\tKeywords\tUser\tPost ID\tLikes\n\
             Atlas\tCells\tscrna liver\tAda\t4\t5\n\
             Scans\tMRI\tbrain\tBo\t\t0\n",
        )?;

        let catalog = Catalog::load(&paths)?;
        let posts = catalog.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, PostId(4));
        assert_eq!(posts[0].likes, 5);
        assert_eq!(posts[0].keywords, vec!["scrna", "liver"]);
        assert_eq!(posts[1].id, PostId(5));
        assert!(posts[1].date.is_none());
        Ok(())
    }

    #[test]
    fn test_like_records_override_likes_column() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let paths = DataPaths::from_root(dir.path().to_path_buf());
        fs::write(&paths.posts, "Title\tUser\tPost ID\tLikes\nAtlas\tAda\t1\t9\n")?;
        fs::write(&paths.likes, "Post ID\tUser ID\n1\t1\n1\t2\n")?;

        let catalog = Catalog::load(&paths)?;
        assert_eq!(catalog.posts()[0].likes, 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_post_ids_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::from_root(dir.path().to_path_buf());
        fs::write(&paths.posts, "Title\tPost ID\nA\t1\nB\t1\n").unwrap();

        match Catalog::load(&paths) {
            Err(CatalogError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_renumber_is_idempotent() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.tsv");
        fs::write(
            &path,
            "Title\tPost ID\tLikes\nA\t7\t1\nB\t7\t2\nC\t\t0\n",
        )?;

        assert_eq!(renumber_posts(&path)?.rows, 3);
        let first = fs::read_to_string(&path)?;
        assert_eq!(renumber_posts(&path)?.rows, 3);
        let second = fs::read_to_string(&path)?;

        assert_eq!(first, second);
        let table = Table::read(&path)?;
        let ids: Vec<_> = table.records().map(|r| r.get(POST_ID_COLUMN).to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        Ok(())
    }

    #[test]
    fn test_renumber_adds_missing_column() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.tsv");
        fs::write(&path, "Title\nA\nB\n")?;

        renumber_posts(&path)?;
        let table = Table::read(&path)?;
        assert_eq!(table.header, vec!["Title", POST_ID_COLUMN]);
        assert_eq!(table.rows[1], vec!["B", "2"]);
        Ok(())
    }

    #[test]
    fn test_legacy_likes_survive_save_and_reload() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let paths = DataPaths::from_root(dir.path().to_path_buf());
        fs::write(&paths.users, "Name\tEmail\nAda\tada@example.org\n")?;
        fs::write(&paths.posts, "Title\tUser\tPost ID\tLikes\nAtlas\tAda\t1\t5\n")?;

        let mut catalog = Catalog::load(&paths)?;
        assert_eq!(catalog.posts()[0].likes, 5);
        catalog.add_comment(PostId(1), UserId(1), "still here?")?;
        catalog.save(&paths)?;

        let mut reloaded = Catalog::load(&paths)?;
        assert_eq!(reloaded.posts()[0].likes, 5);

        // A real like stacks on top of the carried-over count
        assert!(reloaded.toggle_like(PostId(1), UserId(1))?);
        reloaded.save(&paths)?;
        let again = Catalog::load(&paths)?;
        assert_eq!(again.posts()[0].likes, 6);
        assert_eq!(again.like_count(), 1);
        Ok(())
    }

    #[test]
    fn test_renumber_moves_likes_and_comments() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let paths = DataPaths::from_root(dir.path().to_path_buf());
        fs::write(&paths.users, "Name\tEmail\nAda\tada@example.org\n")?;
        fs::write(
            &paths.posts,
            "Title\tUser\tPost ID\nA\tAda\t3\nB\tAda\t7\n",
        )?;
        fs::write(&paths.likes, "Post ID\tUser ID\n7\t1\n9\t1\n")?;
        fs::write(
            &paths.comments,
            "Comment ID\tPost ID\tUser ID\tText\tLikes\n1\t3\t1\tfirst\t0\n",
        )?;

        let (renumbering, dropped) = renumber_catalog(&paths)?;
        assert_eq!(renumbering.rows, 2);
        assert_eq!(renumbering.ids.get(&PostId(7)), Some(&PostId(2)));
        // The like for post 9 pointed at nothing
        assert_eq!(dropped, 1);

        let catalog = Catalog::load(&paths)?;
        let b = catalog.post_by_title("B")?;
        assert_eq!(b.id, PostId(2));
        assert_eq!(b.likes, 1);
        assert_eq!(catalog.comments_for(PostId(1)).len(), 1);
        Ok(())
    }

    #[test]
    fn test_renumber_duplicate_ids_keep_first_row() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.tsv");
        fs::write(&path, "Title\tPost ID\nA\t4\nB\t4\n")?;

        let renumbering = renumber_posts(&path)?;
        assert_eq!(renumbering.ids.len(), 1);
        assert_eq!(renumbering.ids.get(&PostId(4)), Some(&PostId(1)));
        Ok(())
    }

    #[test]
    fn test_renumber_keeps_other_cells_byte_for_byte() -> CatalogResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.tsv");
        fs::write(
            &path,
            "Title\tDescription\tPost ID\r\nA\tfiles in C:\\data\\raw\t1\r\n\r\nB\tx\\ty\t9\r\n",
        )?;

        renumber_posts(&path)?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "Title\tDescription\tPost ID\r\nA\tfiles in C:\\data\\raw\t1\r\n\r\nB\tx\\ty\t2\r\n"
        );

        // Read back verbatim: no escape sequences are interpreted
        let table = Table::read(&path)?;
        assert_eq!(table.rows[0][1], r"files in C:\data\raw");
        Ok(())
    }
}
