//! Layered configuration for wagerd: built-in defaults, an optional file,
//! then `WAGER_`-prefixed environment variables, in that order.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            payments: PaymentsConfig::default(),
            catalog: CatalogConfig::default(),
            scheduler: SchedulerConfig::default(),
            chat: ChatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }
}

/// Storage backend. `pg_url` empty means in-memory; set it (via
/// `WAGER_STORAGE_PG_URL` or a config file) to run against Postgres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub pg_url: String,
    #[serde(default = "default_pool_size")]
    pub pg_max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub pg_connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pg_url: String::new(),
            pg_max_connections: default_pool_size(),
            pg_connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl StorageConfig {
    pub fn is_postgres(&self) -> bool {
        !self.pg_url.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub crypto_pay_token: String,
    #[serde(default)]
    pub crypto_pay_base_url: Option<String>,
    #[serde(default = "default_asset")]
    pub crypto_default_asset: String,
    #[serde(default = "default_fee_pct")]
    pub fee_pct: f64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            crypto_pay_token: String::new(),
            crypto_pay_base_url: None,
            crypto_default_asset: default_asset(),
            fee_pct: default_fee_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub gsheet_csv_url: Option<String>,
    #[serde(default = "default_catalog_interval")]
    pub sync_interval_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            gsheet_csv_url: None,
            sync_interval_secs: default_catalog_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_settlement_interval")]
    pub settlement_interval_secs: u64,
    #[serde(default = "default_admin_reminder_interval")]
    pub admin_reminder_interval_secs: u64,
    #[serde(default = "default_admin_reminder_grace_secs")]
    pub admin_reminder_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            settlement_interval_secs: default_settlement_interval(),
            admin_reminder_interval_secs: default_admin_reminder_interval(),
            admin_reminder_grace_secs: default_admin_reminder_grace_secs(),
        }
    }
}

/// Fields threaded through to the (out-of-scope) chat presentation
/// surface but never acted on by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Comma-separated external ids, e.g. `"tg:1,tg:2"`.
    #[serde(default)]
    pub admin_ids: String,
    #[serde(default)]
    pub main_menu_photo_url: Option<String>,
    #[serde(default)]
    pub events_menu_photo_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_ids: String::new(),
            main_menu_photo_url: None,
            events_menu_photo_url: None,
        }
    }
}

impl ChatConfig {
    pub fn admin_id_list(&self) -> Vec<String> {
        self.admin_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_pool_size() -> u32 {
    10
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_asset() -> String {
    "USDT".to_string()
}
fn default_fee_pct() -> f64 {
    0.10
}
fn default_catalog_interval() -> u64 {
    60
}
fn default_reconcile_interval() -> u64 {
    6
}
fn default_settlement_interval() -> u64 {
    30
}
fn default_admin_reminder_interval() -> u64 {
    300
}
fn default_admin_reminder_grace_secs() -> u64 {
    900
}
fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WAGER")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_storage_with_fee_from_spec_example() {
        let config = DaemonConfig::default();
        assert!(!config.storage.is_postgres());
        assert_eq!(config.payments.fee_pct, 0.10);
        assert_eq!(config.server.listen_addr.port(), 8080);
    }

    #[test]
    fn admin_ids_split_on_comma_and_trim() {
        let chat = ChatConfig {
            admin_ids: " tg:1, tg:2 ,, tg:3".to_string(),
            ..ChatConfig::default()
        };
        assert_eq!(chat.admin_id_list(), vec!["tg:1", "tg:2", "tg:3"]);
    }
}
