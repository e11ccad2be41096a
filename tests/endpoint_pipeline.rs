//! End-to-end tests driving the resource server over HTTP
//!
//! These tests verify the complete flow from request to response: route
//! registration, authorization, binding, persistence and rendering for both
//! JSON and view clients.

use std::sync::Arc;

use axum_test::TestServer;
use rudder::prelude::*;
use serde_json::{Value, json};

// =============================================================================
// Test fixtures
// =============================================================================

fn article_schema() -> FieldSchema {
    FieldSchema::new()
        .field("title", FieldSpec::string().required().max_len(200))
        .field("slug", FieldSpec::string().format(FieldFormat::Slug))
        .field(
            "kind",
            FieldSpec::string()
                .one_of(["text", "video"])
                .default_value(json!("text")),
        )
        .field("body", FieldSpec::string().in_variant("text"))
        .field(
            "video_url",
            FieldSpec::string().format(FieldFormat::Url).in_variant("video"),
        )
        .field(
            "public",
            FieldSpec::boolean().default_value(json!(false)),
        )
        .discriminated_by("kind")
}

fn article_policy() -> ResourcePolicy {
    ResourcePolicy::owner_edits()
        .with_can_create(|ctx| ctx.is_authenticated())
        .with_custom(|op, ctx, resource| {
            if op.action() != "publish" {
                return Verdict::forbidden("unknown operation");
            }
            match (ctx.actor_id(), resource) {
                (Some(actor), Some(r)) if r.is_owned_by(actor) => {
                    Verdict::allow_privileged("owner may publish")
                }
                (Some(_), _) => Verdict::forbidden("only the owner may publish"),
                (None, _) => Verdict::unauthenticated("sign in to publish"),
            }
        })
}

fn article_spec() -> ResourceSpec {
    ResourceSpec::new("article", article_schema())
        .with_policy(article_policy())
        .with_query(
            QueryOptions::default()
                .with_sortable(["title", "created_at"])
                .with_filterable(["kind"]),
        )
        .with_unique("slug")
        .with_custom_operation("publish")
}

fn comment_spec() -> ResourceSpec {
    let schema = FieldSchema::new().field("body", FieldSpec::string().required());
    ResourceSpec::new("comment", schema)
        .with_policy(
            ResourcePolicy::owner_edits().with_can_create(|ctx| ctx.is_authenticated()),
        )
        .with_parent("article")
}

fn test_templates() -> Arc<TeraRenderer> {
    let renderer = TeraRenderer::from_templates(vec![
        (
            "article/list.html",
            "<ul>{% for item in items %}<li>{{ item.fields.title }}</li>{% endfor %}</ul>",
        ),
        ("article/item.html", "<h1>{{ resource.fields.title }}</h1>"),
        (
            "article/form.html",
            "<form>{% for field, msgs in errors %}<p class=\"error\">{{ field }}</p>{% endfor %}\
             <input name=\"title\" value=\"{{ values.title | default(value='') }}\"></form>",
        ),
        ("error.html", "<h1>{{ status }}</h1><p>{{ message }}</p>"),
    ])
    .expect("test templates should parse");
    Arc::new(renderer)
}

fn build_server() -> TestServer {
    let app = ServerBuilder::new()
        .with_store(MemoryStore::new().with_unique("article", "slug"))
        .register(article_spec())
        .register(comment_spec())
        .with_views(test_templates())
        .build()
        .expect("server should build");
    TestServer::new(app)
}

fn build_server_with_sink() -> (TestServer, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let app = ServerBuilder::new()
        .with_store(MemoryStore::new())
        .register(article_spec())
        .with_audit_sink(sink.clone())
        .build()
        .expect("server should build");
    (TestServer::new(app), sink)
}

fn actor_header() -> (Uuid, String) {
    let id = Uuid::new_v4();
    (id, id.to_string())
}

async fn create_article(server: &TestServer, actor: &str, title: &str) -> Value {
    let response = server
        .post("/articles")
        .add_header("x-actor-id", actor)
        .json(&json!({ "title": title }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()
}

// =============================================================================
// Health
// =============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoints() {
        let server = build_server();
        for path in ["/health", "/healthz"] {
            let response = server.get(path).await;
            response.assert_status_ok();
            let body: Value = response.json();
            assert_eq!(body["status"], "ok");
        }
    }
}

// =============================================================================
// CRUD over JSON
// =============================================================================

mod crud_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_view() {
        let server = build_server();
        let (_, actor) = actor_header();

        let body = create_article(&server, &actor, "Hello World").await;
        assert_eq!(body["resource"]["fields"]["title"], "Hello World");
        assert_eq!(body["notice"], "Article created");
        let id = body["resource"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["location"], format!("/articles/{}", id));

        let response = server
            .get(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
        let fetched: Value = response.json();
        assert_eq!(fetched["fields"]["title"], "Hello World");
        assert_eq!(fetched["fields"]["kind"], "text");
    }

    #[tokio::test]
    async fn test_anonymous_create_is_401() {
        let server = build_server();
        let response = server
            .post("/articles")
            .json(&json!({ "title": "Nope" }))
            .await;
        response.assert_status_unauthorized();
        let body: Value = response.json();
        assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn test_missing_required_field_echoes_values() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .json(&json!({ "slug": "draft-one" }))
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["errors"]["title"].is_array());
        assert_eq!(body["details"]["values"]["slug"], "draft-one");
    }

    #[tokio::test]
    async fn test_patch_preserves_absent_fields() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Original").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .patch(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "body": "Some text" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["title"], "Original");
        assert_eq!(body["resource"]["fields"]["body"], "Some text");
    }

    #[tokio::test]
    async fn test_put_resets_absent_fields_to_defaults() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Original").await;
        let id = created["resource"]["id"].as_str().unwrap();

        server
            .patch(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "body": "Some text" }))
            .await
            .assert_status_ok();

        let response = server
            .put(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "Replaced" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["title"], "Replaced");
        assert_eq!(body["resource"]["fields"]["kind"], "text");
        assert_eq!(body["resource"]["fields"]["body"], Value::Null);
    }

    #[tokio::test]
    async fn test_non_owner_edit_is_403() {
        let server = build_server();
        let (_, owner) = actor_header();
        let (_, intruder) = actor_header();

        let created = create_article(&server, &owner, "Mine").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .patch(&format!("/articles/{}", id))
            .add_header("x-actor-id", &intruder)
            .json(&json!({ "title": "Taken over" }))
            .await;
        response.assert_status_forbidden();
        let body: Value = response.json();
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_anonymous_edit_is_401() {
        let server = build_server();
        let (_, owner) = actor_header();

        let created = create_article(&server, &owner, "Mine").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .patch(&format!("/articles/{}", id))
            .json(&json!({ "title": "Anonymous edit" }))
            .await;
        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn test_delete_then_404() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Short lived").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .delete(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["notice"], "Article deleted");
        assert_eq!(body["location"], "/articles");

        let response = server
            .get(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_field_error() {
        let server = build_server();
        let (_, actor) = actor_header();

        server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "First", "slug": "the-slug" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "Second", "slug": "the-slug" }))
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(
            body["errors"]["slug"][0]
                .as_str()
                .unwrap()
                .contains("already taken")
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = build_server();
        let response = server.get("/widgets").await;
        response.assert_status_not_found();
    }
}

// =============================================================================
// Listing, visibility and pagination
// =============================================================================

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_scopes_to_visibility() {
        let server = build_server();
        let (_, alice) = actor_header();
        let (_, bob) = actor_header();

        create_article(&server, &alice, "Alice draft").await;
        server
            .post("/articles")
            .add_header("x-actor-id", &alice)
            .json(&json!({ "title": "Alice public", "public": true }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        create_article(&server, &bob, "Bob draft").await;

        // Alice sees her two; the public one is also hers
        let response = server
            .get("/articles")
            .add_header("x-actor-id", &alice)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 2);

        // Anonymous sees only the public article
        let response = server.get("/articles").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 1);

        // An admin sees everything
        let admin = Uuid::new_v4().to_string();
        let response = server
            .get("/articles")
            .add_header("x-actor-id", &admin)
            .add_header("x-actor-admin", "true")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn test_pagination_meta() {
        let server = build_server();
        let (_, actor) = actor_header();
        for i in 0..5 {
            create_article(&server, &actor, &format!("Article {}", i)).await;
        }

        let response = server
            .get("/articles")
            .add_header("x-actor-id", &actor)
            .add_query_param("page", "2")
            .add_query_param("per_page", "2")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["page"], 2);
        assert_eq!(body["total"], 5);
        assert_eq!(body["total_pages"], 3);
        assert_eq!(body["has_next"], true);
    }

    #[tokio::test]
    async fn test_disallowed_sort_key_is_ignored() {
        let server = build_server();
        let (_, actor) = actor_header();
        create_article(&server, &actor, "B title").await;
        create_article(&server, &actor, "A title").await;

        // "owner_id" is not in the sortable allow-list; the order falls back
        let response = server
            .get("/articles")
            .add_header("x-actor-id", &actor)
            .add_query_param("order", "owner_id")
            .await;
        response.assert_status_ok();

        let response = server
            .get("/articles")
            .add_header("x-actor-id", &actor)
            .add_query_param("order", "title")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let titles: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["fields"]["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["A title", "B title"]);
    }
}

// =============================================================================
// Nested routes
// =============================================================================

mod nested_tests {
    use super::*;

    #[tokio::test]
    async fn test_comment_created_under_article() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Parent").await;
        let article_id = created["resource"]["id"].as_str().unwrap().to_string();

        let response = server
            .post(&format!("/articles/{}/comments", article_id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "body": "Nice post" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["article_id"], article_id);
        let comment_id = body["resource"]["id"].as_str().unwrap();
        assert_eq!(
            body["location"],
            format!("/articles/{}/comments/{}", article_id, comment_id)
        );

        let response = server
            .get(&format!("/articles/{}/comments", article_id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_comments_scoped_to_their_parent() {
        let server = build_server();
        let (_, actor) = actor_header();

        let first = create_article(&server, &actor, "First").await;
        let second = create_article(&server, &actor, "Second").await;
        let first_id = first["resource"]["id"].as_str().unwrap().to_string();
        let second_id = second["resource"]["id"].as_str().unwrap().to_string();

        server
            .post(&format!("/articles/{}/comments", first_id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "body": "On the first" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = server
            .get(&format!("/articles/{}/comments", second_id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_comment_not_reachable_under_wrong_parent() {
        let server = build_server();
        let (_, actor) = actor_header();

        let first = create_article(&server, &actor, "First").await;
        let second = create_article(&server, &actor, "Second").await;
        let first_id = first["resource"]["id"].as_str().unwrap().to_string();
        let second_id = second["resource"]["id"].as_str().unwrap().to_string();

        let created = server
            .post(&format!("/articles/{}/comments", first_id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "body": "On the first" }))
            .await;
        created.assert_status(axum::http::StatusCode::CREATED);
        let comment_id = created.json::<Value>()["resource"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        // The other article's path does not contain this comment
        let response = server
            .get(&format!("/articles/{}/comments/{}", second_id, comment_id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_not_found();

        let response = server
            .get(&format!("/articles/{}/comments/{}", first_id, comment_id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_malformed_parent_id_is_400() {
        let server = build_server();
        let (_, actor) = actor_header();
        let response = server
            .get("/articles/not-a-uuid/comments")
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_bad_request();
    }
}

// =============================================================================
// Method override and custom operations
// =============================================================================

mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_post_with_delete_override() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Override me").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .post(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .add_query_param("method", "DELETE")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["notice"], "Article deleted");
    }

    #[tokio::test]
    async fn test_post_with_patch_override() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Before").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .post(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .add_query_param("method", "PATCH")
            .json(&json!({ "title": "After" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["title"], "After");
    }

    #[tokio::test]
    async fn test_bare_post_on_item_is_400() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Target").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .post(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "No verb" }))
            .await;
        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn test_override_ignored_on_get() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Still here").await;
        let id = created["resource"]["id"].as_str().unwrap();

        // The override only applies to POST requests
        let response = server
            .get(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .add_query_param("method", "DELETE")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["fields"]["title"], "Still here");
    }

    #[tokio::test]
    async fn test_custom_operation_by_owner() {
        let server = build_server();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Publishable").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .post(&format!("/articles/{}/publish", id))
            .add_header("x-actor-id", &actor)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["notice"], "Article publish");
    }

    #[tokio::test]
    async fn test_custom_operation_denied_for_non_owner() {
        let server = build_server();
        let (_, owner) = actor_header();
        let (_, other) = actor_header();

        let created = create_article(&server, &owner, "Protected").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .post(&format!("/articles/{}/publish", id))
            .add_header("x-actor-id", &other)
            .await;
        response.assert_status_forbidden();
    }
}

// =============================================================================
// Variant switching
// =============================================================================

mod variant_tests {
    use super::*;

    #[tokio::test]
    async fn test_switching_kind_nulls_old_variant_payload() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "Post", "kind": "text", "body": "Words" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let id = response.json::<Value>()["resource"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = server
            .patch(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "kind": "video", "video_url": "https://example.com/v.mp4" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["kind"], "video");
        assert_eq!(
            body["resource"]["fields"]["video_url"],
            "https://example.com/v.mp4"
        );
        assert_eq!(body["resource"]["fields"]["body"], Value::Null);
    }

    #[tokio::test]
    async fn test_inactive_variant_field_is_not_validated() {
        let server = build_server();
        let (_, actor) = actor_header();

        // video_url carries a url format, but the text variant masks it
        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "Post", "kind": "text", "video_url": "not a url" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }
}

// =============================================================================
// View rendering
// =============================================================================

mod view_tests {
    use super::*;

    #[tokio::test]
    async fn test_html_list_renders_template() {
        let server = build_server();
        let (_, actor) = actor_header();
        create_article(&server, &actor, "Rendered").await;

        let response = server
            .get("/articles")
            .add_header("x-actor-id", &actor)
            .add_header("accept", "text/html")
            .await;
        response.assert_status_ok();
        assert!(response.text().contains("<li>Rendered</li>"));
    }

    #[tokio::test]
    async fn test_render_param_overrides_accept() {
        let server = build_server();
        let (_, actor) = actor_header();
        create_article(&server, &actor, "Json please").await;

        let response = server
            .get("/articles")
            .add_header("x-actor-id", &actor)
            .add_header("accept", "text/html")
            .add_query_param("render", "json")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_view_mutation_redirects_to_location() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .add_header("accept", "text/html")
            .json(&json!({ "title": "Redirected" }))
            .await;
        response.assert_status(axum::http::StatusCode::SEE_OTHER);
        let location = response.header("location");
        assert!(location.to_str().unwrap().starts_with("/articles/"));
    }

    #[tokio::test]
    async fn test_view_mutation_honors_next_param() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .add_header("accept", "text/html")
            .add_query_param("next", "/dashboard")
            .json(&json!({ "title": "Going home" }))
            .await;
        response.assert_status(axum::http::StatusCode::SEE_OTHER);
        assert_eq!(response.header("location").to_str().unwrap(), "/dashboard");
    }

    #[tokio::test]
    async fn test_view_validation_failure_rerenders_form() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .add_header("accept", "text/html")
            .json(&json!({ "slug": "kept-value" }))
            .await;
        response.assert_status_bad_request();
        let html = response.text();
        assert!(html.contains("class=\"error\""));
        assert!(html.contains("title"));
    }

    #[tokio::test]
    async fn test_anonymous_html_get_redirects_to_login() {
        let (_, owner) = actor_header();
        let server = build_server();

        let created = create_article(&server, &owner, "Private").await;
        let id = created["resource"]["id"].as_str().unwrap();

        let response = server
            .get(&format!("/articles/{}", id))
            .add_header("accept", "text/html")
            .await;
        response.assert_status(axum::http::StatusCode::SEE_OTHER);
        let location = response.header("location").to_str().unwrap().to_string();
        assert!(location.starts_with("/login?next="));
        assert!(location.contains(id));
    }

    #[tokio::test]
    async fn test_new_form_returns_schema_defaults() {
        let server = build_server();
        let response = server.get("/articles/new").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["values"]["kind"], "text");
        assert_eq!(body["values"]["public"], false);
        assert_eq!(body["intent"], "create");
    }

    #[tokio::test]
    async fn test_new_form_honors_requested_intent() {
        let server = build_server();
        let response = server
            .get("/articles/new")
            .add_query_param("intent", "replace")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["intent"], "replace");
    }
}

// =============================================================================
// Form-encoded submissions
// =============================================================================

mod form_tests {
    use super::*;

    #[tokio::test]
    async fn test_form_encoded_create() {
        let server = build_server();
        let (_, actor) = actor_header();

        let response = server
            .post("/articles")
            .add_header("x-actor-id", &actor)
            .form(&[("title", "From a form"), ("public", "on")])
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["resource"]["fields"]["title"], "From a form");
        // "on" coerces to a boolean through the schema
        assert_eq!(body["resource"]["fields"]["public"], true);
        assert_eq!(body["resource"]["public"], true);
    }
}

// =============================================================================
// Audit trail
// =============================================================================

mod audit_tests {
    use super::*;

    #[tokio::test]
    async fn test_mutations_reach_the_sink() {
        let (server, sink) = build_server_with_sink();
        let (_, actor) = actor_header();

        let created = create_article(&server, &actor, "Audited").await;
        let id = created["resource"]["id"].as_str().unwrap();

        server
            .patch(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .json(&json!({ "title": "Audited twice" }))
            .await
            .assert_status_ok();

        server
            .delete(&format!("/articles/{}", id))
            .add_header("x-actor-id", &actor)
            .await
            .assert_status_ok();

        let actions: Vec<String> = sink
            .entries()
            .iter()
            .map(|entry| entry.action.clone())
            .collect();
        assert_eq!(actions, vec!["create", "edit", "delete"]);
        assert!(
            sink.entries()
                .iter()
                .all(|entry| entry.target_type == "article")
        );
    }
}
