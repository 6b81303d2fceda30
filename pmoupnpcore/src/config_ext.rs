//! Extension pour lire la configuration de la pile UPnP depuis pmoconfig
//!
//! Ce module fournit le trait `UpnpConfigExt`, implémenté pour
//! `pmoconfig::Config`, et l'instantané typé [`UpnpSettings`] transmis aux
//! composants par la racine de composition.
//!
//! Toutes les clés vivent sous `upnp:` ; une clé absente ou mal typée
//! donne la valeur par défaut.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::Value;

const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_HTTP_PORT: u16 = 0;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_SIZE: usize = 32;
const DEFAULT_MAINTENANCE_INTERVAL_MILLIS: u64 = 1000;
const DEFAULT_SUBSCRIPTION_DURATION_SECS: u64 = 1800;
const DEFAULT_RENEWAL_MARGIN_SECS: u64 = 60;
const DEFAULT_MAX_DELIVERY_FAILURES: u32 = 3;
const DEFAULT_SSDP_ENABLED: bool = true;
const DEFAULT_ANNOUNCE_INTERVAL_SECS: u64 = 900;
const DEFAULT_MAX_AGE_SECS: u32 = 1800;
const DEFAULT_SEARCH_MX: u32 = 3;
const DEFAULT_PRODUCT_NAME: &str = "PMOUPnP";
const DEFAULT_PRODUCT_VERSION: &str = "0.1";

/// Réglages de la pile, lus une fois au démarrage.
#[derive(Debug, Clone, PartialEq)]
pub struct UpnpSettings {
    pub bind_address: IpAddr,
    /// 0 : port choisi par le système
    pub http_port: u16,
    pub http_timeout: Duration,
    pub pool_size: usize,
    pub maintenance_interval: Duration,
    /// Durée d'abonnement demandée, et accordée par défaut aux abonnés
    pub subscription_duration: Duration,
    pub renewal_margin: Duration,
    /// Échecs NOTIFY consécutifs tolérés avant de retirer un abonné
    pub max_delivery_failures: u32,
    pub ssdp_enabled: bool,
    pub announce_interval: Duration,
    pub max_age: u32,
    pub search_mx: u32,
    pub product_name: String,
    pub product_version: String,
    pub namespace_base: String,
}

impl Default for UpnpSettings {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            http_port: DEFAULT_HTTP_PORT,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            pool_size: DEFAULT_POOL_SIZE,
            maintenance_interval: Duration::from_millis(DEFAULT_MAINTENANCE_INTERVAL_MILLIS),
            subscription_duration: Duration::from_secs(DEFAULT_SUBSCRIPTION_DURATION_SECS),
            renewal_margin: Duration::from_secs(DEFAULT_RENEWAL_MARGIN_SECS),
            max_delivery_failures: DEFAULT_MAX_DELIVERY_FAILURES,
            ssdp_enabled: DEFAULT_SSDP_ENABLED,
            announce_interval: Duration::from_secs(DEFAULT_ANNOUNCE_INTERVAL_SECS),
            max_age: DEFAULT_MAX_AGE_SECS,
            search_mx: DEFAULT_SEARCH_MX,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            product_version: DEFAULT_PRODUCT_VERSION.to_string(),
            namespace_base: String::new(),
        }
    }
}

impl UpnpSettings {
    /// Valeur des en-têtes `SERVER` : `<os>/<version> UPnP/1.0 <produit>/<version>`
    pub fn server_header(&self) -> String {
        format!(
            "{}/1.0 UPnP/1.0 {}/{}",
            std::env::consts::OS,
            self.product_name,
            self.product_version
        )
    }

    /// Valeur des en-têtes `USER-AGENT` des requêtes émises
    pub fn user_agent(&self) -> String {
        self.server_header()
    }
}

/// Trait d'extension pour ajouter la configuration UPnP à pmoconfig
///
/// # Exemple
///
/// ```rust,no_run
/// use pmoconfig::Config;
/// use pmoupnpcore::UpnpConfigExt;
///
/// let config = Config::load_config("")?;
/// config.set_upnp_http_port(8200)?;
/// let settings = config.upnp_settings();
/// assert_eq!(settings.http_port, 8200);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub trait UpnpConfigExt {
    /// Adresse d'écoute du serveur HTTP (défaut: 0.0.0.0)
    fn get_upnp_bind_address(&self) -> Result<IpAddr>;

    /// Port du serveur HTTP (défaut: 0, port libre)
    fn get_upnp_http_port(&self) -> Result<u16>;

    fn set_upnp_http_port(&self, port: u16) -> Result<()>;

    /// Délai des requêtes HTTP sortantes
    fn get_upnp_http_timeout(&self) -> Result<Duration>;

    /// Nombre de messages entrants traités simultanément
    fn get_upnp_pool_size(&self) -> Result<usize>;

    /// Période de la maintenance du registre
    fn get_upnp_maintenance_interval(&self) -> Result<Duration>;

    /// Durée des abonnements GENA
    fn get_upnp_subscription_duration(&self) -> Result<Duration>;

    fn set_upnp_subscription_duration(&self, duration: Duration) -> Result<()>;

    /// Avance du renouvellement sur l'expiration
    fn get_upnp_renewal_margin(&self) -> Result<Duration>;

    /// Échecs de livraison consécutifs tolérés par abonné
    fn get_upnp_max_delivery_failures(&self) -> Result<u32>;

    fn get_upnp_ssdp_enabled(&self) -> Result<bool>;

    fn set_upnp_ssdp_enabled(&self, enabled: bool) -> Result<()>;

    fn get_upnp_announce_interval(&self) -> Result<Duration>;

    /// `max-age` des annonces, en secondes
    fn get_upnp_max_age(&self) -> Result<u32>;

    /// MX des M-SEARCH émis
    fn get_upnp_search_mx(&self) -> Result<u32>;

    fn get_upnp_product_name(&self) -> Result<String>;

    fn get_upnp_product_version(&self) -> Result<String>;

    /// Préfixe des chemins HTTP locaux
    fn get_upnp_namespace_base(&self) -> Result<String>;

    /// Instantané de tous les réglages
    fn upnp_settings(&self) -> UpnpSettings;
}

fn u64_or(config: &Config, path: &[&str], default: u64) -> u64 {
    match config.get_value(path) {
        Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

impl UpnpConfigExt for Config {
    fn get_upnp_bind_address(&self) -> Result<IpAddr> {
        let raw = self.get_string_or(&["upnp", "stream", "bind_address"], "");
        Ok(raw.parse().unwrap_or(DEFAULT_BIND_ADDRESS))
    }

    fn get_upnp_http_port(&self) -> Result<u16> {
        let port = u64_or(self, &["upnp", "stream", "http_port"], DEFAULT_HTTP_PORT as u64);
        Ok(u16::try_from(port).unwrap_or(DEFAULT_HTTP_PORT))
    }

    fn set_upnp_http_port(&self, port: u16) -> Result<()> {
        self.set_u64(&["upnp", "stream", "http_port"], port as u64)
    }

    fn get_upnp_http_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            u64_or(self, &["upnp", "stream", "timeout_secs"], DEFAULT_HTTP_TIMEOUT_SECS).max(1),
        ))
    }

    fn get_upnp_pool_size(&self) -> Result<usize> {
        let size = u64_or(self, &["upnp", "executor", "pool_size"], DEFAULT_POOL_SIZE as u64);
        Ok(usize::try_from(size).unwrap_or(DEFAULT_POOL_SIZE).max(1))
    }

    fn get_upnp_maintenance_interval(&self) -> Result<Duration> {
        Ok(Duration::from_millis(
            u64_or(
                self,
                &["upnp", "registry", "maintenance_interval_millis"],
                DEFAULT_MAINTENANCE_INTERVAL_MILLIS,
            )
            .max(10),
        ))
    }

    fn get_upnp_subscription_duration(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            u64_or(self, &["upnp", "gena", "duration_secs"], DEFAULT_SUBSCRIPTION_DURATION_SECS).max(1),
        ))
    }

    fn set_upnp_subscription_duration(&self, duration: Duration) -> Result<()> {
        self.set_u64(&["upnp", "gena", "duration_secs"], duration.as_secs())
    }

    fn get_upnp_renewal_margin(&self) -> Result<Duration> {
        Ok(Duration::from_secs(u64_or(
            self,
            &["upnp", "gena", "renewal_margin_secs"],
            DEFAULT_RENEWAL_MARGIN_SECS,
        )))
    }

    fn get_upnp_max_delivery_failures(&self) -> Result<u32> {
        let failures = u64_or(
            self,
            &["upnp", "gena", "max_delivery_failures"],
            DEFAULT_MAX_DELIVERY_FAILURES as u64,
        );
        Ok(u32::try_from(failures).unwrap_or(DEFAULT_MAX_DELIVERY_FAILURES).max(1))
    }

    fn get_upnp_ssdp_enabled(&self) -> Result<bool> {
        match self.get_value(&["upnp", "ssdp", "enabled"]) {
            Ok(Value::Bool(b)) => Ok(b),
            _ => Ok(DEFAULT_SSDP_ENABLED),
        }
    }

    fn set_upnp_ssdp_enabled(&self, enabled: bool) -> Result<()> {
        self.set_value(&["upnp", "ssdp", "enabled"], Value::Bool(enabled))
    }

    fn get_upnp_announce_interval(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            u64_or(
                self,
                &["upnp", "ssdp", "announce_interval_secs"],
                DEFAULT_ANNOUNCE_INTERVAL_SECS,
            )
            .max(1),
        ))
    }

    fn get_upnp_max_age(&self) -> Result<u32> {
        let age = u64_or(self, &["upnp", "ssdp", "max_age_secs"], DEFAULT_MAX_AGE_SECS as u64);
        Ok(u32::try_from(age).unwrap_or(DEFAULT_MAX_AGE_SECS))
    }

    fn get_upnp_search_mx(&self) -> Result<u32> {
        let mx = u64_or(self, &["upnp", "ssdp", "search_mx"], DEFAULT_SEARCH_MX as u64);
        Ok(u32::try_from(mx).unwrap_or(DEFAULT_SEARCH_MX).clamp(1, 5))
    }

    fn get_upnp_product_name(&self) -> Result<String> {
        Ok(self.get_string_or(&["upnp", "product", "name"], DEFAULT_PRODUCT_NAME))
    }

    fn get_upnp_product_version(&self) -> Result<String> {
        Ok(self.get_string_or(&["upnp", "product", "version"], DEFAULT_PRODUCT_VERSION))
    }

    fn get_upnp_namespace_base(&self) -> Result<String> {
        Ok(self.get_string_or(&["upnp", "namespace", "base_path"], ""))
    }

    fn upnp_settings(&self) -> UpnpSettings {
        let defaults = UpnpSettings::default();
        UpnpSettings {
            bind_address: self.get_upnp_bind_address().unwrap_or(defaults.bind_address),
            http_port: self.get_upnp_http_port().unwrap_or(defaults.http_port),
            http_timeout: self.get_upnp_http_timeout().unwrap_or(defaults.http_timeout),
            pool_size: self.get_upnp_pool_size().unwrap_or(defaults.pool_size),
            maintenance_interval: self
                .get_upnp_maintenance_interval()
                .unwrap_or(defaults.maintenance_interval),
            subscription_duration: self
                .get_upnp_subscription_duration()
                .unwrap_or(defaults.subscription_duration),
            renewal_margin: self.get_upnp_renewal_margin().unwrap_or(defaults.renewal_margin),
            max_delivery_failures: self
                .get_upnp_max_delivery_failures()
                .unwrap_or(defaults.max_delivery_failures),
            ssdp_enabled: self.get_upnp_ssdp_enabled().unwrap_or(defaults.ssdp_enabled),
            announce_interval: self
                .get_upnp_announce_interval()
                .unwrap_or(defaults.announce_interval),
            max_age: self.get_upnp_max_age().unwrap_or(defaults.max_age),
            search_mx: self.get_upnp_search_mx().unwrap_or(defaults.search_mx),
            product_name: self.get_upnp_product_name().unwrap_or(defaults.product_name),
            product_version: self.get_upnp_product_version().unwrap_or(defaults.product_version),
            namespace_base: self.get_upnp_namespace_base().unwrap_or(defaults.namespace_base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_match_settings_defaults() {
        let config = Config::embedded().unwrap();
        assert_eq!(config.upnp_settings(), UpnpSettings::default());
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let config = Config::from_yaml_str(
            "upnp:\n  stream:\n    http_port: 8200\n    bind_address: not-an-ip\n  gena:\n    duration_secs: 300\n  namespace:\n    base_path: /upnp\n",
        )
        .unwrap();
        let settings = config.upnp_settings();
        assert_eq!(settings.http_port, 8200);
        assert_eq!(settings.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(settings.subscription_duration, Duration::from_secs(300));
        assert_eq!(settings.namespace_base, "/upnp");
        assert_eq!(settings.renewal_margin, Duration::from_secs(DEFAULT_RENEWAL_MARGIN_SECS));
    }

    #[test]
    fn test_setters_round_trip() {
        let config = Config::embedded().unwrap();
        config.set_upnp_subscription_duration(Duration::from_secs(120)).unwrap();
        config.set_upnp_ssdp_enabled(false).unwrap();
        assert_eq!(config.get_upnp_subscription_duration().unwrap(), Duration::from_secs(120));
        assert!(!config.get_upnp_ssdp_enabled().unwrap());
    }

    #[test]
    fn test_server_header() {
        let settings = UpnpSettings::default();
        assert!(settings.server_header().contains(" UPnP/1.0 PMOUPnP/0.1"));
    }
}
