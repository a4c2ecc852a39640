//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use billing_hex::inbound::GatewayConfigs;
use billing_hex::outbound::{ClickConfig, DEFAULT_GATEWAY_TIMEOUT, OctoConfig, PaymeConfig, StripeConfig};

/// Outward callback target.
pub struct CallbackConfig {
    pub url: String,
    pub secret: String,
}

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub gateway_timeout: Duration,
    pub gateways: GatewayConfigs,
    pub callback: Option<CallbackConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", 3000)?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let gateway_timeout = match lookup("GATEWAY_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(parse("GATEWAY_TIMEOUT_SECS", &secs)?),
            None => DEFAULT_GATEWAY_TIMEOUT,
        };

        let gateways = GatewayConfigs {
            click: click(&lookup)?,
            payme: payme(&lookup),
            stripe: stripe(&lookup),
            octo: octo(&lookup)?,
        };

        let callback = match (lookup("CALLBACK_URL"), lookup("CALLBACK_SECRET")) {
            (Some(url), Some(secret)) => Some(CallbackConfig { url, secret }),
            (Some(_), None) => anyhow::bail!("CALLBACK_URL is set but CALLBACK_SECRET is not"),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            gateway_timeout,
            gateways,
            callback,
        })
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |v| parse(key, &v))
}

/// Click needs all four variables; a partial set is a startup error.
fn click<F: Fn(&str) -> Option<String>>(lookup: &F) -> anyhow::Result<Option<ClickConfig>> {
    let keys = [
        "CLICK_SERVICE_ID",
        "CLICK_MERCHANT_ID",
        "CLICK_MERCHANT_USER_ID",
        "CLICK_SECRET_KEY",
    ];
    let values: Vec<Option<String>> = keys.iter().map(|k| lookup(k)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    let [Some(service), Some(merchant), Some(user), Some(secret)] = <[Option<String>; 4]>::try_from(values)
        .map_err(|_| anyhow::anyhow!("unexpected click configuration shape"))?
    else {
        anyhow::bail!("Click needs all of {}", keys.join(", "));
    };
    Ok(Some(ClickConfig::new(
        parse("CLICK_SERVICE_ID", &service)?,
        parse("CLICK_MERCHANT_ID", &merchant)?,
        parse("CLICK_MERCHANT_USER_ID", &user)?,
        secret,
    )))
}

fn payme<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<PaymeConfig> {
    let config = PaymeConfig::new(lookup("PAYME_MERCHANT_ID")?, lookup("PAYME_SECRET_KEY")?);
    Some(match lookup("PAYME_USER") {
        Some(user) => config.with_user(user),
        None => config,
    })
}

fn stripe<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<StripeConfig> {
    let config = StripeConfig::new(lookup("STRIPE_SECRET_KEY")?, lookup("STRIPE_SIGNING_SECRET")?);
    Some(match lookup("STRIPE_API_BASE_URL") {
        Some(url) => config.with_base_url(url),
        None => config,
    })
}

fn octo<F: Fn(&str) -> Option<String>>(lookup: &F) -> anyhow::Result<Option<OctoConfig>> {
    let (Some(shop_id), Some(secret), Some(unique_key)) = (
        lookup("OCTO_SHOP_ID"),
        lookup("OCTO_SECRET"),
        lookup("OCTO_UNIQUE_KEY"),
    ) else {
        return Ok(None);
    };
    let mut config = OctoConfig::new(parse("OCTO_SHOP_ID", &shop_id)?, secret, unique_key);
    if let Some(url) = lookup("OCTO_NOTIFY_URL") {
        config = config.with_notify_url(url);
    }
    if let Some(url) = lookup("OCTO_API_BASE_URL") {
        config = config.with_base_url(url);
    }
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "sqlite::memory:")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.gateway_timeout, DEFAULT_GATEWAY_TIMEOUT);
        assert!(config.gateways.click.is_none());
        assert!(config.gateways.payme.is_none());
        assert!(config.gateways.stripe.is_none());
        assert!(config.gateways.octo.is_none());
        assert!(config.callback.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert!(load(&[]).is_err());
    }

    #[test]
    fn test_gateways_enabled_by_their_variables() {
        let config = load(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "8080"),
            ("GATEWAY_TIMEOUT_SECS", "5"),
            ("CLICK_SERVICE_ID", "1"),
            ("CLICK_MERCHANT_ID", "2"),
            ("CLICK_MERCHANT_USER_ID", "3"),
            ("CLICK_SECRET_KEY", "k"),
            ("PAYME_MERCHANT_ID", "m"),
            ("PAYME_SECRET_KEY", "s"),
            ("OCTO_SHOP_ID", "42"),
            ("OCTO_SECRET", "secret"),
            ("OCTO_UNIQUE_KEY", "unique"),
            ("OCTO_NOTIFY_URL", "https://example.com/billing/octo"),
            ("CALLBACK_URL", "https://example.com/hook"),
            ("CALLBACK_SECRET", "cb"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway_timeout, Duration::from_secs(5));
        let click = config.gateways.click.unwrap();
        assert_eq!((click.service_id, click.merchant_id, click.merchant_user_id), (1, 2, 3));
        assert_eq!(config.gateways.payme.unwrap().user, "Paycom");
        assert!(config.gateways.stripe.is_none());
        let octo = config.gateways.octo.unwrap();
        assert_eq!(octo.shop_id, 42);
        assert_eq!(octo.notify_url.as_deref(), Some("https://example.com/billing/octo"));
        assert_eq!(config.callback.unwrap().url, "https://example.com/hook");
    }

    #[test]
    fn test_partial_click_is_rejected() {
        let result = load(&[("DATABASE_URL", "x"), ("CLICK_SERVICE_ID", "1")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(load(&[("DATABASE_URL", "x"), ("PORT", "http")]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("GATEWAY_TIMEOUT_SECS", "-1")]).is_err());
    }
}
