//! Map validated CLI arguments to the action the binary executes.

use crate::auth::MIN_JWT_SECRET_BYTES;
use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::{bail, Context, Result};
use secrecy::ExposeSecret;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or the signing secret is too short.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    if auth_opts.jwt_secret.expose_secret().len() < MIN_JWT_SECRET_BYTES {
        bail!("--jwt-secret must be at least {MIN_JWT_SECRET_BYTES} bytes");
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        jwt_issuer: auth_opts.jwt_issuer,
        jwt_audience: auth_opts.jwt_audience,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
        argon2_memory_kib: auth_opts.argon2_memory_kib,
        argon2_iterations: auth_opts.argon2_iterations,
        argon2_parallelism: auth_opts.argon2_parallelism,
    }))
}
