//! Authentication and authorization building blocks.
//!
//! # Purpose and responsibility
//! Houses the signing-key store, the public-key cache, the verified-caller
//! type, and the policy engine that decides every request.
//!
//! # Key invariants and assumptions
//! - Signing keys are ES256 over P-256 and immutable once written.
//! - The policy engine is the only component that verifies bearer
//!   credentials; handlers trust the caller in the request extensions.
pub mod cache;
pub mod caller;
pub mod keys;
pub mod policy;
