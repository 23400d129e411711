use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::error::{AppError, AppResult};
use crate::core::error::{CatalogError, Entity};
use crate::core::model::{
    Comment, CommentId, DatasetMetadata, FileInfo, NewPost, NewUser, Post, PostId, Profile,
    ProfileUpdate, User, UserId,
};
use crate::core::query::{SearchFilters, SortOrder};
use crate::core::upload::{accept_upload, sanitize_filename};
use crate::state::AppState;

type AppStateRef = State<Arc<AppState>>;

// ===== Users =====

pub async fn register_handler(
    State(state): AppStateRef,
    Json(new): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let mut catalog = state.catalog();
    let id = catalog.register_user(new)?;
    state.save(&catalog)?;
    info!(user = %id, "registered user");
    let user = catalog.user(id)?.clone();
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn profile_handler(
    State(state): AppStateRef,
    Path(id): Path<UserId>,
) -> AppResult<Json<Profile>> {
    let profile = state.catalog().profile(id)?;
    Ok(Json(profile))
}

pub async fn update_profile_handler(
    State(state): AppStateRef,
    Path(id): Path<UserId>,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let mut catalog = state.catalog();
    let user = catalog.update_profile(id, update)?.clone();
    state.save(&catalog)?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
}

pub async fn login_handler(
    State(state): AppStateRef,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<User>> {
    let user = state.catalog().find_user_by_email(&payload.email)?.clone();
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct TextQuery {
    #[serde(default)]
    q: String,
}

pub async fn search_users_handler(
    State(state): AppStateRef,
    Query(query): Query<TextQuery>,
) -> Json<Vec<User>> {
    let catalog = state.catalog();
    let users: Vec<User> = catalog.search_users(&query.q).into_iter().cloned().collect();
    Json(users)
}

pub async fn follow_handler(
    State(state): AppStateRef,
    Path((id, target)): Path<(UserId, UserId)>,
) -> AppResult<Json<Value>> {
    let mut catalog = state.catalog();
    let changed = catalog.follow(id, target)?;
    if changed {
        state.save(&catalog)?;
    }
    Ok(Json(json!({ "changed": changed })))
}

pub async fn unfollow_handler(
    State(state): AppStateRef,
    Path((id, target)): Path<(UserId, UserId)>,
) -> AppResult<Json<Value>> {
    let mut catalog = state.catalog();
    let changed = catalog.unfollow(id, target)?;
    if changed {
        state.save(&catalog)?;
    }
    Ok(Json(json!({ "changed": changed })))
}

// ===== Posts =====

#[derive(Deserialize)]
pub struct PostQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    sort: String,
    #[serde(flatten)]
    filters: SearchFilters,
}

pub async fn search_posts_handler(
    State(state): AppStateRef,
    Query(query): Query<PostQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let sort: SortOrder = query.sort.parse()?;
    let catalog = state.catalog();
    let posts: Vec<Post> = catalog
        .search(&query.q, &query.filters, sort)?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(posts))
}

#[derive(Serialize)]
pub struct PostDetail {
    post: Post,
    comments: Vec<Comment>,
    file: Option<FileInfo>,
}

pub async fn get_post_handler(
    State(state): AppStateRef,
    Path(id): Path<PostId>,
) -> AppResult<Json<PostDetail>> {
    let catalog = state.catalog();
    let post = catalog.post(id)?.clone();
    let file = post
        .filename
        .as_deref()
        .and_then(|f| catalog.file_info(&state.uploads, f).ok());
    let comments = catalog.comments_for(id).into_iter().cloned().collect();
    Ok(Json(PostDetail {
        post,
        comments,
        file,
    }))
}

/// What happened to the file part of a post submission
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    None,
    Stored { filename: String },
    Rejected { filename: String, reason: String },
}

#[derive(Serialize)]
pub struct CreatedPost {
    post: Post,
    upload: UploadOutcome,
}

/// Multipart post submission. Text parts carry the post fields and
/// `user_id`; an optional `file` part carries the dataset.
pub async fn create_post_handler(
    State(state): AppStateRef,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<CreatedPost>)> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedPayload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
            if !filename.is_empty() {
                file = Some((filename, data.to_vec()));
            }
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
            fields.insert(name, text);
        }
    }

    let user_id: UserId = fields
        .get("user_id")
        .ok_or_else(|| CatalogError::invalid("user_id is required"))?
        .parse()
        .map_err(|_| CatalogError::invalid("user_id must be a number"))?;
    let author = state.catalog().user(user_id)?.name.clone();

    // Everything that can reject the post is checked before a file lands on disk
    let field = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let title = field("title").trim().to_string();
    if title.is_empty() {
        return Err(CatalogError::invalid("post title is required").into());
    }
    if author.trim().is_empty() {
        return Err(CatalogError::invalid("post author is required").into());
    }
    let metadata = metadata_from_form(&fields)?;

    let upload = match file {
        None => UploadOutcome::None,
        Some((raw, data)) => match accept_upload(&raw, &state.config.allowed_extensions) {
            Ok(filename) => {
                tokio::fs::create_dir_all(&state.uploads)
                    .await
                    .map_err(CatalogError::from)?;
                tokio::fs::write(state.uploads.join(&filename), data)
                    .await
                    .map_err(CatalogError::from)?;
                UploadOutcome::Stored { filename }
            }
            Err(e) => UploadOutcome::Rejected {
                filename: raw,
                reason: e.to_string(),
            },
        },
    };

    let new = NewPost {
        title,
        description: field("description"),
        keywords: NewPost::parse_keywords(&field("keywords")),
        metadata,
        filename: match &upload {
            UploadOutcome::Stored { filename } => Some(filename.clone()),
            _ => None,
        },
        author,
        date: Some(
            fields
                .get("date")
                .filter(|d| !d.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| chrono::Local::now().date_naive().to_string()),
        ),
    };

    let created = state.catalog().create_post(new);
    let id = match created {
        Ok(id) => id,
        Err(e) => {
            if let UploadOutcome::Stored { filename } = &upload {
                if let Err(io) = tokio::fs::remove_file(state.uploads.join(filename)).await {
                    tracing::warn!("Failed to remove orphaned upload {}: {}", filename, io);
                }
            }
            return Err(e.into());
        }
    };
    info!(post = %id, ?upload, "created post");

    let post = {
        let catalog = state.catalog();
        state.save(&catalog)?;
        let post = catalog.post(id)?.clone();
        post
    };
    Ok((StatusCode::CREATED, Json(CreatedPost { post, upload })))
}

// Dataset metadata parts share the field names of DatasetMetadata
fn metadata_from_form(fields: &HashMap<String, String>) -> AppResult<DatasetMetadata> {
    let map: Map<String, Value> = fields
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    serde_json::from_value(Value::Object(map)).map_err(|e| AppError::MalformedPayload(e.to_string()))
}

#[derive(Deserialize)]
pub struct ActorRequest {
    user_id: UserId,
}

pub async fn like_post_handler(
    State(state): AppStateRef,
    Path(id): Path<PostId>,
    Json(payload): Json<ActorRequest>,
) -> AppResult<Json<Value>> {
    let mut catalog = state.catalog();
    let liked = catalog.toggle_like(id, payload.user_id)?;
    if liked {
        state.save(&catalog)?;
    }
    let likes = catalog.post(id)?.likes;
    Ok(Json(json!({ "liked": liked, "likes": likes })))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    user_id: UserId,
    text: String,
}

pub async fn add_comment_handler(
    State(state): AppStateRef,
    Path(id): Path<PostId>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let mut catalog = state.catalog();
    let comment_id = catalog.add_comment(id, payload.user_id, &payload.text)?;
    state.save(&catalog)?;
    let comment = catalog
        .comments()
        .iter()
        .find(|c| c.id == comment_id)
        .cloned()
        .ok_or(CatalogError::NotFound(Entity::Comment(comment_id)))?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn like_comment_handler(
    State(state): AppStateRef,
    Path(id): Path<CommentId>,
    Json(payload): Json<ActorRequest>,
) -> AppResult<Json<Value>> {
    let mut catalog = state.catalog();
    let liked = catalog.like_comment(id, payload.user_id)?;
    if liked {
        state.save(&catalog)?;
    }
    Ok(Json(json!({ "liked": liked })))
}

// ===== Similarity =====

#[derive(Deserialize)]
pub struct SimilarityQuery {
    title: String,
    n: Option<usize>,
}

#[derive(Serialize)]
pub struct NeighborJson {
    post: Post,
    distance: f64,
}

pub async fn closest_handler(
    State(state): AppStateRef,
    Query(query): Query<SimilarityQuery>,
) -> AppResult<Json<Vec<NeighborJson>>> {
    let n = query.n.unwrap_or(state.config.similarity.n_closest);
    let neighbors = tokio::task::spawn_blocking(move || -> AppResult<Vec<NeighborJson>> {
        let catalog = state.catalog();
        let mut engine = state.engine();
        let neighbors: Vec<NeighborJson> = engine
            .closest(&catalog, &query.title, n)?
            .into_iter()
            .map(|nb| NeighborJson {
                post: nb.post.clone(),
                distance: nb.distance,
            })
            .collect();
        Ok(neighbors)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(neighbors))
}

pub async fn graph_handler(
    State(state): AppStateRef,
    Query(query): Query<SimilarityQuery>,
) -> AppResult<Html<String>> {
    let n = query.n.unwrap_or(state.config.similarity.n_closest);
    let html = tokio::task::spawn_blocking(move || -> AppResult<String> {
        let catalog = state.catalog();
        let mut engine = state.engine();
        let html = engine.graph(&catalog, &query.title, n, &state.config.graph)?;
        Ok(html)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Html(html))
}

// ===== Files =====

/// Serve an uploaded file and count the download.
pub async fn download_handler(
    State(state): AppStateRef,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    // Only names the upload path could have produced are served
    if sanitize_filename(&filename) != filename {
        return Err(CatalogError::NotFound(Entity::File(filename)).into());
    }
    let data = tokio::fs::read(state.uploads.join(&filename))
        .await
        .map_err(|_| CatalogError::NotFound(Entity::File(filename.clone())))?;

    {
        let mut catalog = state.catalog();
        catalog.record_download(&filename);
        state.save(&catalog)?;
    }

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    ))
}

pub async fn file_info_handler(
    State(state): AppStateRef,
    Path(filename): Path<String>,
) -> AppResult<Json<FileInfo>> {
    if sanitize_filename(&filename) != filename {
        return Err(CatalogError::NotFound(Entity::File(filename)).into());
    }
    let info = state.catalog().file_info(&state.uploads, &filename)?;
    Ok(Json(info))
}
