use crate::{
    api,
    auth::{AuthConfig, PasswordPolicy},
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Args {
    fn password_policy(&self) -> Result<PasswordPolicy> {
        // Params::new enforces the ranges argon2 accepts.
        argon2::Params::new(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
            None,
        )
        .map_err(|err| anyhow!("Invalid Argon2 parameters: {err}"))?;

        Ok(PasswordPolicy {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        })
    }

    fn auth_config(self) -> Result<(String, u16, AuthConfig, bool)> {
        let policy = self.password_policy()?;
        let config = AuthConfig::new(self.jwt_secret)
            .with_issuer(self.jwt_issuer)
            .with_audience(self.jwt_audience)
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)
            .with_password_policy(policy);
        Ok((self.dsn, self.port, config, self.cookie_secure))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is unusable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let (dsn, port, auth_config, cookie_secure) = args.auth_config()?;

    debug!("Auth config: {:?}", auth_config);

    api::new(port, dsn, auth_config, cookie_secure).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn args() -> Args {
        Args {
            port: 8080,
            dsn: "postgres://localhost/rotacio".to_string(),
            jwt_secret: SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            jwt_issuer: "issuer".to_string(),
            jwt_audience: "audience".to_string(),
            access_token_ttl_seconds: 60,
            refresh_token_ttl_seconds: 3600,
            cookie_secure: true,
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }

    #[test]
    fn builds_auth_config() -> Result<()> {
        let (dsn, port, config, secure) = args().auth_config()?;
        assert_eq!(dsn, "postgres://localhost/rotacio");
        assert_eq!(port, 8080);
        assert!(secure);
        assert_eq!(config.issuer(), "issuer");
        assert_eq!(config.audience(), "audience");
        assert_eq!(config.access_token_ttl(), chrono::Duration::seconds(60));
        assert_eq!(config.refresh_token_ttl_seconds(), 3600);
        assert_eq!(
            config.jwt_secret().expose_secret(),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(config.password_policy().memory_kib, 19456);
        Ok(())
    }

    #[test]
    fn rejects_unusable_argon2_params() {
        let mut args = args();
        args.argon2_parallelism = 0;
        assert!(args.auth_config().is_err());
    }
}
