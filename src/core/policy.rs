//! Declarative, role/ownership-based authorization
//!
//! Authorization is pure decision logic: given an operation, a request
//! context and an optional target resource, [`ResourcePolicy::authorize`]
//! returns a [`Verdict`]. Entity types do not subclass anything; they
//! register a [`ResourcePolicy`] with the predicate hooks relevant to their
//! ownership model and the fixed algorithm composes them.
//!
//! No operation proceeds past a denied verdict under any circumstance,
//! including debug modes. Callers translate denials to HTTP errors using
//! the verdict's `error_code`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::operation::Operation;
use crate::core::resource::Resource;

/// Predicate over an actor and a concrete resource.
pub type ResourcePredicate = Arc<dyn Fn(&RequestContext, &Resource) -> bool + Send + Sync>;

/// Predicate over an actor alone (class-level checks).
pub type ClassPredicate = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Hook for entity-specific custom operations.
pub type CustomHook =
    Arc<dyn Fn(&Operation, &RequestContext, Option<&Resource>) -> Verdict + Send + Sync>;

/// An authorization decision.
///
/// Invariant: a denied verdict always carries a non-2xx error code
/// (401 unauthenticated, 403 forbidden). The constructors enforce this.
/// `privileged` marks decisions that would not hold for an anonymous actor;
/// it is recorded for auditing and never relaxes later checks.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
    pub privileged: bool,
    pub error_code: u16,
    pub restricted_fields: Option<BTreeSet<String>>,
}

impl Verdict {
    /// An allowed verdict that also holds for anonymous actors.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            privileged: false,
            error_code: 200,
            restricted_fields: None,
        }
    }

    /// An allowed verdict that depends on the actor's identity or roles.
    pub fn allow_privileged(reason: impl Into<String>) -> Self {
        Self {
            privileged: true,
            ..Self::allow(reason)
        }
    }

    /// Denied because no authenticated actor is present (401).
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            privileged: false,
            error_code: 401,
            restricted_fields: None,
        }
    }

    /// Denied for an authenticated actor (403).
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            privileged: false,
            error_code: 403,
            restricted_fields: None,
        }
    }

    /// Restrict the fields visible to this actor on an allowed verdict.
    pub fn with_restricted_fields(mut self, fields: BTreeSet<String>) -> Self {
        self.restricted_fields = Some(fields);
        self
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// Deny with 401 for anonymous actors, 403 otherwise.
fn deny(ctx: &RequestContext, reason: impl Into<String>) -> Verdict {
    if ctx.is_authenticated() {
        Verdict::forbidden(reason)
    } else {
        Verdict::unauthenticated(reason)
    }
}

/// The per-entity predicate set composed by the fixed authorization
/// algorithm.
///
/// Defaults are deny-by-default: `is_editor` and `is_reader` never match,
/// `can_create` denies, `custom` denies with a generic message. `is_public`
/// reads the resource's public flag and `allow_list` allows, matching the
/// default open list behavior.
#[derive(Clone)]
pub struct ResourcePolicy {
    is_editor: ResourcePredicate,
    is_reader: ResourcePredicate,
    is_public: ResourcePredicate,
    can_create: ClassPredicate,
    allow_list: ClassPredicate,
    custom: CustomHook,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourcePolicy {
    pub fn new() -> Self {
        Self {
            is_editor: Arc::new(|_, _| false),
            is_reader: Arc::new(|_, _| false),
            is_public: Arc::new(|_, resource| resource.public),
            can_create: Arc::new(|_| false),
            allow_list: Arc::new(|_| true),
            custom: Arc::new(|op, ctx, _| {
                deny(ctx, format!("operation '{}' is not permitted", op.action()))
            }),
        }
    }

    /// A policy where the resource owner is its editor. The common case.
    pub fn owner_edits() -> Self {
        Self::new().with_editor(|ctx, resource| {
            ctx.actor_id().is_some_and(|id| resource.is_owned_by(id))
        })
    }

    pub fn with_editor(
        mut self,
        f: impl Fn(&RequestContext, &Resource) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_editor = Arc::new(f);
        self
    }

    pub fn with_reader(
        mut self,
        f: impl Fn(&RequestContext, &Resource) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_reader = Arc::new(f);
        self
    }

    pub fn with_public(
        mut self,
        f: impl Fn(&RequestContext, &Resource) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_public = Arc::new(f);
        self
    }

    pub fn with_can_create(
        mut self,
        f: impl Fn(&RequestContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.can_create = Arc::new(f);
        self
    }

    pub fn with_allow_list(
        mut self,
        f: impl Fn(&RequestContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.allow_list = Arc::new(f);
        self
    }

    pub fn with_custom(
        mut self,
        f: impl Fn(&Operation, &RequestContext, Option<&Resource>) -> Verdict
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.custom = Arc::new(f);
        self
    }

    /// The ordered, first-match authorization algorithm.
    ///
    /// `resource` must be `None` for class-level operations (list, create,
    /// view-as-empty-form) and `Some` for item operations.
    pub fn authorize(
        &self,
        op: &Operation,
        ctx: &RequestContext,
        resource: Option<&Resource>,
    ) -> Verdict {
        let verdict = self.decide(op, ctx, resource);
        if verdict.is_denied() {
            tracing::debug!(
                operation = op.action(),
                actor = ?ctx.actor_id(),
                code = verdict.error_code,
                reason = %verdict.reason,
                "authorization denied"
            );
        }
        verdict
    }

    fn decide(&self, op: &Operation, ctx: &RequestContext, resource: Option<&Resource>) -> Verdict {
        match op {
            Operation::List => {
                if (self.allow_list)(ctx) {
                    Verdict::allow("listing is open")
                } else {
                    deny(ctx, "listing is restricted")
                }
            }

            Operation::Create => {
                if !ctx.is_authenticated() {
                    return Verdict::unauthenticated("creation requires authentication");
                }
                if ctx.is_admin() {
                    Verdict::allow_privileged("administrator may create")
                } else if (self.can_create)(ctx) {
                    Verdict::allow_privileged("creation permitted by policy")
                } else {
                    Verdict::forbidden("creation is not permitted")
                }
            }

            Operation::View => match resource {
                // Serving an empty creation form
                None => Verdict::allow("empty form is open"),
                Some(resource) => {
                    if (self.is_public)(ctx, resource) {
                        return Verdict::allow("resource is public");
                    }
                    if !ctx.is_authenticated() {
                        return Verdict::unauthenticated("resource is not public");
                    }
                    if ctx.is_admin() {
                        Verdict::allow_privileged("administrator may view")
                    } else if (self.is_editor)(ctx, resource) {
                        Verdict::allow_privileged("editor may view")
                    } else if (self.is_reader)(ctx, resource) {
                        Verdict::allow_privileged("reader may view")
                    } else {
                        Verdict::forbidden("not a reader of this resource")
                    }
                }
            },

            // Delete shares the edit authorization class
            Operation::Edit | Operation::Replace | Operation::Delete => match resource {
                None => deny(ctx, "no target resource"),
                Some(resource) => {
                    if !ctx.is_authenticated() {
                        return Verdict::unauthenticated("modification requires authentication");
                    }
                    if ctx.is_admin() {
                        Verdict::allow_privileged("administrator may modify")
                    } else if (self.is_editor)(ctx, resource) {
                        Verdict::allow_privileged("editor may modify")
                    } else {
                        Verdict::forbidden("not an editor of this resource")
                    }
                }
            },

            Operation::Custom(_) => (self.custom)(op, ctx, resource),
        }
    }
}

impl std::fmt::Debug for ResourcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePolicy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Actor;
    use uuid::Uuid;

    fn anon() -> RequestContext {
        RequestContext::anonymous()
    }

    fn user(id: Uuid) -> RequestContext {
        RequestContext::authenticated(Actor::new(id))
    }

    fn admin() -> RequestContext {
        RequestContext::authenticated(Actor::admin(Uuid::new_v4()))
    }

    #[test]
    fn test_list_allowed_by_default_for_anonymous() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::List, &anon(), None);
        assert!(verdict.allowed);
        assert!(!verdict.privileged);
    }

    #[test]
    fn test_list_override_denies() {
        let policy = ResourcePolicy::new().with_allow_list(|ctx| ctx.is_authenticated());
        let denied = policy.authorize(&Operation::List, &anon(), None);
        assert!(denied.is_denied());
        assert_eq!(denied.error_code, 401);

        let allowed = policy.authorize(&Operation::List, &user(Uuid::new_v4()), None);
        assert!(allowed.allowed);
    }

    #[test]
    fn test_create_requires_authentication() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::Create, &anon(), None);
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 401);
    }

    #[test]
    fn test_create_denied_by_default_for_plain_user() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::Create, &user(Uuid::new_v4()), None);
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 403);
    }

    #[test]
    fn test_create_allowed_for_admin_and_is_privileged() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::Create, &admin(), None);
        assert!(verdict.allowed);
        assert!(verdict.privileged);
    }

    #[test]
    fn test_create_policy_default_hook() {
        let policy = ResourcePolicy::new().with_can_create(|_| true);
        let verdict = policy.authorize(&Operation::Create, &user(Uuid::new_v4()), None);
        assert!(verdict.allowed);
        assert!(verdict.privileged);
    }

    #[test]
    fn test_view_without_resource_allowed() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::View, &anon(), None);
        assert!(verdict.allowed);
    }

    #[test]
    fn test_view_public_resource_allowed_anonymously() {
        let policy = ResourcePolicy::new();
        let resource = Resource::new("article").with_public(true);
        let verdict = policy.authorize(&Operation::View, &anon(), Some(&resource));
        assert!(verdict.allowed);
        assert!(!verdict.privileged);
    }

    #[test]
    fn test_view_private_resource_denied_anonymously() {
        let policy = ResourcePolicy::new();
        let resource = Resource::new("article");
        let verdict = policy.authorize(&Operation::View, &anon(), Some(&resource));
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 401);
    }

    #[test]
    fn test_view_private_resource_reader_hook() {
        let reader_id = Uuid::new_v4();
        let policy = ResourcePolicy::new()
            .with_reader(move |ctx, _| ctx.actor_id() == Some(reader_id));
        let resource = Resource::new("article");

        let verdict = policy.authorize(&Operation::View, &user(reader_id), Some(&resource));
        assert!(verdict.allowed);
        assert!(verdict.privileged);

        let verdict = policy.authorize(&Operation::View, &user(Uuid::new_v4()), Some(&resource));
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 403);
    }

    #[test]
    fn test_edit_non_owner_forbidden_not_privileged() {
        // Scenario: authenticated non-owner, not an administrator
        let owner = Uuid::new_v4();
        let policy = ResourcePolicy::owner_edits();
        let resource = Resource::new("article").with_owner(owner);

        let verdict = policy.authorize(&Operation::Edit, &user(Uuid::new_v4()), Some(&resource));
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 403);
        assert!(!verdict.privileged);
    }

    #[test]
    fn test_edit_owner_allowed() {
        let owner = Uuid::new_v4();
        let policy = ResourcePolicy::owner_edits();
        let resource = Resource::new("article").with_owner(owner);

        let verdict = policy.authorize(&Operation::Edit, &user(owner), Some(&resource));
        assert!(verdict.allowed);
        assert!(verdict.privileged);
    }

    #[test]
    fn test_delete_shares_edit_class() {
        let owner = Uuid::new_v4();
        let policy = ResourcePolicy::owner_edits();
        let resource = Resource::new("article").with_owner(owner);

        assert!(
            policy
                .authorize(&Operation::Delete, &user(owner), Some(&resource))
                .allowed
        );
        assert!(
            policy
                .authorize(&Operation::Delete, &user(Uuid::new_v4()), Some(&resource))
                .is_denied()
        );
        assert!(
            policy
                .authorize(&Operation::Delete, &anon(), Some(&resource))
                .is_denied()
        );
    }

    #[test]
    fn test_edit_without_resource_denied() {
        let policy = ResourcePolicy::new();
        let verdict = policy.authorize(&Operation::Edit, &admin(), None);
        assert!(verdict.is_denied());
    }

    #[test]
    fn test_custom_operation_denied_by_default() {
        let policy = ResourcePolicy::new();
        let op = Operation::Custom("publish".to_string());
        let verdict = policy.authorize(&op, &user(Uuid::new_v4()), None);
        assert!(verdict.is_denied());
        assert_eq!(verdict.error_code, 403);
        assert!(verdict.reason.contains("publish"));
    }

    #[test]
    fn test_custom_operation_hook() {
        let policy = ResourcePolicy::new().with_custom(|op, ctx, _| {
            if op.action() == "publish" && ctx.is_admin() {
                Verdict::allow_privileged("administrator may publish")
            } else {
                Verdict::forbidden("publishing is restricted")
            }
        });
        let op = Operation::Custom("publish".to_string());
        assert!(policy.authorize(&op, &admin(), None).allowed);
        assert!(
            policy
                .authorize(&op, &user(Uuid::new_v4()), None)
                .is_denied()
        );
    }

    #[test]
    fn test_denied_verdicts_carry_error_codes() {
        let policy = ResourcePolicy::new();
        let cases = [
            policy.authorize(&Operation::Create, &anon(), None),
            policy.authorize(&Operation::Create, &user(Uuid::new_v4()), None),
            policy.authorize(&Operation::Edit, &anon(), Some(&Resource::new("x"))),
        ];
        for verdict in cases {
            assert!(verdict.is_denied());
            assert!(
                verdict.error_code == 401 || verdict.error_code == 403,
                "denied verdict must carry 401 or 403, got {}",
                verdict.error_code
            );
        }
    }

    #[test]
    fn test_restricted_fields_carried_on_verdict() {
        let verdict = Verdict::allow("ok")
            .with_restricted_fields(["cost_price".to_string()].into_iter().collect());
        let fields = verdict.restricted_fields.expect("should carry fields");
        assert!(fields.contains("cost_price"));
    }
}
