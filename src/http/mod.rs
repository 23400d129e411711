//! JSON API over the catalog, plus the similarity graph page.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod error;
pub mod routes;

use crate::state::AppState;
use routes::*;

/// Uploaded datasets can be large; axum's 2 MB default is far too small
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/users", post(register_handler))
        .route("/users/search", get(search_users_handler))
        .route("/users/:id", get(profile_handler).put(update_profile_handler))
        .route(
            "/users/:id/follow/:target",
            post(follow_handler).delete(unfollow_handler),
        )
        .route("/login", post(login_handler))
        .route("/posts", get(search_posts_handler).post(create_post_handler))
        .route("/posts/:id", get(get_post_handler))
        .route("/posts/:id/like", post(like_post_handler))
        .route("/posts/:id/comments", post(add_comment_handler))
        .route("/comments/:id/like", post(like_comment_handler))
        .route("/closest", get(closest_handler))
        .route("/graph", get(graph_handler))
        .route("/uploads/:filename", get(download_handler))
        .route("/uploads/:filename/info", get(file_info_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>) -> Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(
        "Serving {} posts from {} on {address}",
        state.catalog().posts().len(),
        state.paths.root.display()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::core::catalog::tests::{post as new_post, user};
    use crate::core::catalog::Catalog;
    use crate::core::config::{Config, SimilarityConfig};
    use crate::core::paths::DataPaths;

    fn state_with(catalog: Catalog, dir: &std::path::Path) -> Arc<AppState> {
        let config = Config {
            similarity: SimilarityConfig {
                seed: Some(7),
                projection_iterations: 250,
                ..SimilarityConfig::default()
            },
            ..Config::default()
        };
        AppState::ephemeral(DataPaths::from_root(dir.to_path_buf()), config, catalog)
    }

    fn sample() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register_user(user("Ada", "Genomics")).unwrap();
        catalog.register_user(user("Bo", "Imaging")).unwrap();
        for (title, keywords) in [
            ("Liver atlas", "rna-seq liver mouse"),
            ("Brain MRI", "mri brain human"),
            ("Liver proteome", "proteomics liver mouse"),
            ("Kidney atlas", "rna-seq kidney mouse"),
            ("Brain EEG", "eeg brain human"),
            ("Plasma panel", "proteomics plasma human"),
        ] {
            catalog.create_post(new_post(title, keywords, "Ada")).unwrap();
        }
        catalog
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_register_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(Catalog::new(), dir.path()));

        let (status, body) = send_json(
            app.clone(),
            "POST",
            "/users",
            json!({ "name": "Cy", "email": "cy@example.org", "department": "Stats" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_u64().unwrap();

        let (status, profile) = get_json(app.clone(), &format!("/users/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["user"]["name"], "Cy");

        let (status, _) = get_json(app.clone(), "/users/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send_json(app, "POST", "/login", json!({ "email": "CY@example.org" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"].as_u64(), Some(id));
    }

    #[tokio::test]
    async fn test_like_is_counted_once() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, body) =
            send_json(app.clone(), "POST", "/posts/1/like", json!({ "user_id": 2 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "liked": true, "likes": 1 }));

        let (_, body) = send_json(app, "POST", "/posts/1/like", json!({ "user_id": 2 })).await;
        assert_eq!(body, json!({ "liked": false, "likes": 1 }));
    }

    #[tokio::test]
    async fn test_follow_rules() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, _) = send_json(app.clone(), "POST", "/users/1/follow/1", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = send_json(app.clone(), "POST", "/users/1/follow/2", json!({})).await;
        assert_eq!(body["changed"], true);
        let (_, body) = send_json(app.clone(), "POST", "/users/1/follow/2", json!({})).await;
        assert_eq!(body["changed"], false);
        let (_, body) = send_json(app, "DELETE", "/users/1/follow/2", json!({})).await;
        assert_eq!(body["changed"], true);
    }

    #[tokio::test]
    async fn test_search_posts_and_bad_sort() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, body) = get_json(app.clone(), "/posts?q=liver").await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"Liver atlas") && titles.contains(&"Liver proteome"));

        let (status, _) = get_json(app.clone(), "/posts?sort=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app, "/posts?start_date=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_comment_and_detail() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, comment) = send_json(
            app.clone(),
            "POST",
            "/posts/2/comments",
            json!({ "user_id": 1, "text": "Which scanner?" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/comments/{}/like", comment["id"]);
        let (_, body) = send_json(app.clone(), "POST", &uri, json!({ "user_id": 2 })).await;
        assert_eq!(body["liked"], true);

        let (_, detail) = get_json(app, "/posts/2").await;
        assert_eq!(detail["post"]["title"], "Brain MRI");
        assert_eq!(detail["comments"][0]["text"], "Which scanner?");
        assert_eq!(detail["comments"][0]["likes"], 1);
    }

    #[tokio::test]
    async fn test_closest_and_graph() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, body) = get_json(app.clone(), "/closest?title=Liver%20atlas&n=3").await;
        assert_eq!(status, StatusCode::OK);
        let neighbors = body.as_array().unwrap();
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors.iter().all(|n| n["post"]["title"] != "Liver atlas"));

        let (status, _) = get_json(app.clone(), "/closest?title=Unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri("/graph?title=Liver%20atlas")
            .body(Body::empty())
            .unwrap();
        let (status, html) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(html).unwrap().contains("vis.Network"));
    }

    fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
        let boundary = "datashare-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    async fn upload(app: Router, file: Option<(&str, &[u8])>) -> (StatusCode, Value) {
        upload_titled(app, "Uploaded set", file).await
    }

    async fn upload_titled(
        app: Router,
        title: &str,
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart(
            &[
                ("user_id", "1"),
                ("title", title),
                ("keywords", "rna-seq liver"),
                ("organism", "Mus musculus"),
            ],
            file,
        );
        let request = Request::builder()
            .method("POST")
            .uri("/posts")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, body) = upload(app.clone(), Some(("my data.csv", b"a,b\n1,2\n"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["upload"]["status"], "stored");
        assert_eq!(body["upload"]["filename"], "my_data.csv");
        assert_eq!(body["post"]["filename"], "my_data.csv");
        assert_eq!(body["post"]["author"], "Ada");
        assert_eq!(body["post"]["metadata"]["organism"], "Mus musculus");
        assert!(dir.path().join("uploads/my_data.csv").exists());

        let request = Request::builder()
            .uri("/uploads/my_data.csv")
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"a,b\n1,2\n");

        let (_, info) = get_json(app.clone(), "/uploads/my_data.csv/info").await;
        assert_eq!(info["downloads"], 1);
        assert_eq!(info["size_bytes"], 8);

        let (status, _) = get_json(app, "/uploads/..%2Fposts.tsv").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_upload_still_creates_post() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, body) = upload(app, Some(("tool.exe", b"MZ"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["upload"]["status"], "rejected");
        assert_eq!(body["upload"]["filename"], "tool.exe");
        assert!(body["post"]["filename"].is_null());
        assert_eq!(body["post"]["id"], 7);
        assert!(!dir.path().join("uploads/tool.exe").exists());
    }

    #[tokio::test]
    async fn test_upload_requires_known_user() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(Catalog::new(), dir.path()));
        let (status, _) = upload(app, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_title_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(sample(), dir.path()));

        let (status, _) = upload_titled(app.clone(), "   ", Some(("orphan.csv", b"1,2\n"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("uploads/orphan.csv").exists());

        let (_, posts) = get_json(app, "/posts").await;
        assert_eq!(posts.as_array().map(|p| p.len()), Some(6));
    }
}
