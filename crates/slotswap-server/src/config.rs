use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use slotswap_api::mailing::MailingGroups;
use slotswap_api::service::SwapPolicy;
use slotswap_gateway::rooms::ChatPolicy;

/// Known placeholder values that must never be used as a real JWT secret.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub swap_policy: SwapPolicy,
    pub chat_policy: ChatPolicy,
    pub mailerlite_api_key: Option<String>,
    pub mailing_groups: MailingGroups,
    pub mailing_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("SLOTSWAP_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SLOTSWAP_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = match var("SLOTSWAP_PORT") {
            Some(port) => port.parse::<u16>().context("SLOTSWAP_PORT must be a port number")?,
            None => 3000,
        };

        let defaults = SwapPolicy::default();
        let swap_policy = SwapPolicy {
            forbid_self_swap: !parse_flag(var("SLOTSWAP_ALLOW_SELF_SWAP"), "SLOTSWAP_ALLOW_SELF_SWAP")?
                .unwrap_or(!defaults.forbid_self_swap),
            require_book: parse_flag(var("SLOTSWAP_REQUIRE_BOOK"), "SLOTSWAP_REQUIRE_BOOK")?
                .unwrap_or(defaults.require_book),
        };

        let chat_policy = match var("SLOTSWAP_CHAT_POLICY") {
            Some(policy) => policy.parse::<ChatPolicy>().context("SLOTSWAP_CHAT_POLICY")?,
            None => ChatPolicy::default(),
        };

        let mailing_timeout = match var("MAILERLITE_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse::<u64>()
                    .context("MAILERLITE_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => Duration::from_secs(5),
        };

        Ok(Self {
            host: var("SLOTSWAP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("SLOTSWAP_DB_PATH").unwrap_or_else(|| "slotswap.db".into()).into(),
            jwt_secret,
            swap_policy,
            chat_policy,
            mailerlite_api_key: var("MAILERLITE_API_KEY"),
            mailing_groups: MailingGroups {
                pending: var("MAILERLITE_PENDING_GROUP_ID"),
                approved: var("MAILERLITE_APPROVED_GROUP_ID"),
                rejected: var("MAILERLITE_REJECTED_GROUP_ID"),
            },
            mailing_timeout,
        })
    }
}

fn parse_flag(value: Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => bail!("{} must be true or false, got '{}'", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SLOTSWAP_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("SLOTSWAP_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("SLOTSWAP_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.swap_policy, SwapPolicy::default());
        assert_eq!(cfg.chat_policy, ChatPolicy::PartnersOnly);
        assert!(cfg.mailerlite_api_key.is_none());
        assert!(cfg.mailing_groups.pending.is_none());
        assert_eq!(cfg.mailing_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("SLOTSWAP_JWT_SECRET", "a-real-secret"),
            ("SLOTSWAP_PORT", "8080"),
            ("SLOTSWAP_ALLOW_SELF_SWAP", "true"),
            ("SLOTSWAP_REQUIRE_BOOK", "off"),
            ("SLOTSWAP_CHAT_POLICY", "any_authenticated"),
            ("MAILERLITE_API_KEY", "ml-key"),
            ("MAILERLITE_APPROVED_GROUP_ID", "123"),
            ("MAILERLITE_TIMEOUT_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.swap_policy.forbid_self_swap);
        assert!(!cfg.swap_policy.require_book);
        assert_eq!(cfg.chat_policy, ChatPolicy::AnyAuthenticated);
        assert_eq!(cfg.mailerlite_api_key.as_deref(), Some("ml-key"));
        assert_eq!(cfg.mailing_groups.approved.as_deref(), Some("123"));
        assert_eq!(cfg.mailing_timeout, Duration::from_secs(2));
    }

    #[test]
    fn bad_values_are_errors() {
        let secret = ("SLOTSWAP_JWT_SECRET", "a-real-secret");
        assert!(config(&[secret, ("SLOTSWAP_PORT", "http")]).is_err());
        assert!(config(&[secret, ("SLOTSWAP_REQUIRE_BOOK", "maybe")]).is_err());
        assert!(config(&[secret, ("SLOTSWAP_CHAT_POLICY", "everyone")]).is_err());
    }
}
