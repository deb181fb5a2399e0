use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub frontend_url: String,
    pub email_from: String,
    pub require_email_verification: bool,
    pub avatar_bucket: String,
    /// When set, public search only returns verified providers.
    pub search_verified_only: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let token_ttl_days = match lookup("TOKEN_TTL_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or(ConfigError::Invalid {
                    name: "TOKEN_TTL_DAYS",
                    value: raw,
                })?,
            None => 30,
        };

        Ok(Self {
            table_name: lookup("TABLE_NAME").unwrap_or_else(|| "patajob".to_string()),
            jwt_secret,
            token_ttl_days,
            frontend_url: lookup("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            email_from: lookup("EMAIL_FROM")
                .unwrap_or_else(|| "noreply@patajob.co.ke".to_string()),
            require_email_verification: parse_flag(&lookup, "REQUIRE_EMAIL_VERIFICATION")?,
            avatar_bucket: lookup("AVATAR_BUCKET").unwrap_or_else(|| "patajob-avatars".to_string()),
            search_verified_only: parse_flag(&lookup, "SEARCH_VERIFIED_ONLY")?,
        })
    }

    /// Defaults for local runs and the in-memory test suites. The signing key
    /// is a fixed placeholder; deployed lambdas always go through `from_env`.
    pub fn local() -> Self {
        Self {
            table_name: "patajob-local".to_string(),
            jwt_secret: "local-secret-do-not-deploy".to_string(),
            token_ttl_days: 30,
            frontend_url: "http://localhost:5173".to_string(),
            email_from: "noreply@patajob.co.ke".to_string(),
            require_email_verification: false,
            avatar_bucket: "patajob-avatars".to_string(),
            search_verified_only: false,
        }
    }
}

fn parse_flag<F>(lookup: &F, name: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.table_name, "patajob");
        assert_eq!(config.token_ttl_days, 30);
        assert!(!config.require_email_verification);
        assert!(!config.search_verified_only);
    }

    #[test]
    fn test_local_matches_env_defaults() {
        let local = Config::local();
        let from_env = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(local.table_name, "patajob-local");
        assert_eq!(local.token_ttl_days, from_env.token_ttl_days);
        assert_eq!(local.frontend_url, from_env.frontend_url);
        assert_eq!(local.avatar_bucket, from_env.avatar_bucket);
        assert!(!local.require_email_verification);
        assert!(!local.search_verified_only);
    }

    #[test]
    fn test_secret_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_flags_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("TABLE_NAME", "patajob-prod"),
            ("FRONTEND_URL", "https://patajob.co.ke/"),
            ("REQUIRE_EMAIL_VERIFICATION", "true"),
            ("SEARCH_VERIFIED_ONLY", "1"),
            ("TOKEN_TTL_DAYS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.table_name, "patajob-prod");
        assert_eq!(config.frontend_url, "https://patajob.co.ke");
        assert!(config.require_email_verification);
        assert!(config.search_verified_only);
        assert_eq!(config.token_ttl_days, 7);

        let err = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("SEARCH_VERIFIED_ONLY", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SEARCH_VERIFIED_ONLY", .. }));
    }
}
