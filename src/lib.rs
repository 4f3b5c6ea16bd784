//! # Rotacio
//!
//! `rotacio` registers users, verifies passwords and keeps sessions alive with
//! short-lived access tokens backed by long-lived, single-use refresh tokens.
//!
//! ## Refresh-token rotation
//!
//! A refresh token is an opaque 64-byte random secret. Only its SHA-256 digest
//! is persisted, in the `refresh_tokens` ledger, together with its owner,
//! expiry, device descriptor and client address. Every successful refresh
//! stores a brand-new record and flags the presented one revoked inside the
//! same transaction, so:
//!
//! 1. a token refreshes exactly once,
//! 2. a replayed token (already rotated) is answered with `RevokedToken`,
//! 3. a failed write leaves the presented token valid for a retry.
//!
//! Of two requests racing with the same token, the conditional
//! `UPDATE .. WHERE revoked = FALSE` lets exactly one through.
//!
//! ## Access tokens
//!
//! HS256 JWTs with `sub`, `iss`, `aud`, `jti`, `iat`, `nbf` and `exp`. They are
//! verified by signature and time window only; no store lookup is involved.
//!
//! ## Layout
//!
//! - [`auth`]: the engine, token codec and password hashing.
//! - [`store`]: persistence contracts plus Postgres and in-memory adapters.
//! - [`api`]: the axum HTTP edge.
//! - [`cli`]: argument parsing, telemetry and start-up.
//!
//! The database schema lives in `sql/schema.sql`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

pub use api::GIT_COMMIT_HASH;
