//! Request-scoped actor context
//!
//! The engine carries no ambient global state: every pipeline step receives
//! an explicit [`RequestContext`] value, created when the request arrives and
//! discarded with it. Contexts must never be reused across requests.

use axum::http::HeaderMap;
use uuid::Uuid;

/// An authenticated principal.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub roles: Vec<String>,
    pub admin: bool,
}

impl Actor {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            roles: Vec::new(),
            admin: false,
        }
    }

    /// An administrator principal.
    pub fn admin(id: Uuid) -> Self {
        Self {
            id,
            roles: Vec::new(),
            admin: true,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Everything the pipeline knows about the inbound request's principal.
///
/// `actor == None` means an anonymous/public request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub actor: Option<Actor>,
    pub tenant_id: Option<Uuid>,
    pub locale: Option<String>,
}

impl RequestContext {
    /// An anonymous context with no tenant.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context for an authenticated actor.
    pub fn authenticated(actor: Actor) -> Self {
        Self {
            actor: Some(actor),
            tenant_id: None,
            locale: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.actor.as_ref().is_some_and(|a| a.admin)
    }

    pub fn actor_id(&self) -> Option<Uuid> {
        self.actor.as_ref().map(|a| a.id)
    }
}

/// Build a [`RequestContext`] from request headers.
///
/// Recognized headers (set by the host transport's authentication layer):
/// - `x-actor-id`: UUID of the authenticated actor; absent means anonymous
/// - `x-actor-roles`: comma-separated role names
/// - `x-actor-admin`: `true` marks an administrator
/// - `x-tenant-id`: UUID of the owning tenant
/// - `accept-language`: first language tag is kept as the locale
///
/// A malformed `x-actor-id` is treated as anonymous rather than rejected:
/// authorization decides what anonymous actors may do.
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let actor = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(|id| {
            let roles = headers
                .get("x-actor-roles")
                .and_then(|v| v.to_str().ok())
                .map(|s| {
                    s.split(',')
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let admin = headers
                .get("x-actor-admin")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|s| s == "true");
            Actor { id, roles, admin }
        });

    let tenant_id = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());

    let locale = headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    RequestContext {
        actor,
        tenant_id,
        locale,
    }
}
