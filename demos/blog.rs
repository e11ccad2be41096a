//! Complete example with an Axum server
//!
//! This example demonstrates:
//! - Declaring resource schemas with variants and defaults
//! - Owner-edits authorization with a public read flag
//! - Nested comment routes under articles
//! - A custom `publish` operation
//!
//! Run with `cargo run --example blog`, then try:
//!
//! ```text
//! curl -X POST localhost:3000/articles \
//!     -H 'x-actor-id: 6f2b8d9e-0000-0000-0000-000000000001' \
//!     -H 'content-type: application/json' \
//!     -d '{"title": "Hello", "public": true}'
//! curl localhost:3000/articles
//! ```

use rudder::prelude::*;
use serde_json::json;

fn article_spec() -> ResourceSpec {
    let schema = FieldSchema::new()
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
        .field("public", FieldSpec::boolean().default_value(json!(false)))
        .discriminated_by("kind");

    let policy = ResourcePolicy::owner_edits()
        .with_can_create(|ctx| ctx.is_authenticated())
        .with_custom(|op, ctx, resource| match (ctx.actor_id(), resource) {
            _ if op.action() != "publish" => Verdict::forbidden("unknown operation"),
            (Some(actor), Some(r)) if r.is_owned_by(actor) => {
                Verdict::allow_privileged("owner may publish")
            }
            (Some(_), _) => Verdict::forbidden("only the owner may publish"),
            (None, _) => Verdict::unauthenticated("sign in to publish"),
        });

    ResourceSpec::new("article", schema)
        .with_policy(policy)
        .with_query(
            QueryOptions::default()
                .with_sortable(["title", "created_at"])
                .with_filterable(["kind"]),
        )
        .with_unique("slug")
        .with_custom_operation("publish")
}

fn comment_spec() -> ResourceSpec {
    let schema = FieldSchema::new().field("body", FieldSpec::string().required().max_len(2000));
    ResourceSpec::new("comment", schema)
        .with_policy(
            ResourcePolicy::owner_edits().with_can_create(|ctx| ctx.is_authenticated()),
        )
        .with_parent("article")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let store = MemoryStore::new().with_unique("article", "slug");

    ServerBuilder::new()
        .with_store(store)
        .register(article_spec())
        .register(comment_spec())
        .serve("0.0.0.0:3000")
        .await?;

    Ok(())
}
