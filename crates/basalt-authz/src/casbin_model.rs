//! Embedded Casbin model for method-level authorization.
//!
//! # Purpose
//! Stores the RBAC-with-domains model as a compile-time string so every
//! enforcer in the process evaluates the same policy semantics.
//!
//! # Key invariants and assumptions
//! - The request is `(subject, domain, method)` where the domain is a project
//!   or tenant id and the method is a fully-qualified RPC method name.
//! - Role policies use the `*` domain; the grouping rule binds a caller to a
//!   role inside one concrete domain, which is what keeps role grants scoped
//!   to the subjects the caller is actually a member of.

/// Model configuration evaluated by every per-request enforcer.
pub const MODEL_CONF: &str = include_str!("basalt_model.conf");

#[cfg(test)]
mod tests {
    use super::MODEL_CONF;

    #[test]
    fn model_declares_domain_request() {
        assert!(MODEL_CONF.contains("r = sub, dom, obj"));
        assert!(MODEL_CONF.contains("g = _, _, _"));
    }
}
