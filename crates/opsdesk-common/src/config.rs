//! Configuration for opsdesk

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Ticket configuration
    #[serde(default)]
    pub tickets: TicketConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Automation engine configuration
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Notification dispatch configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// MCP (JSON-RPC) module configuration
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Base URL used when rendering absolute links (tracking, portal links)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Secret used to derive session tokens
    #[serde(default)]
    pub secret: String,

    /// Key used to encrypt stored TOTP seeds
    #[serde(default)]
    pub totp_encryption_key: String,

    /// Session lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            totp_encryption_key: String::new(),
            ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24
}

/// Ticket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Status slugs that close a ticket when entered
    #[serde(default = "default_terminal_statuses")]
    pub terminal_statuses: Vec<String>,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            terminal_statuses: default_terminal_statuses(),
        }
    }
}

fn default_terminal_statuses() -> Vec<String> {
    vec!["closed".to_string(), "resolved".to_string()]
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable the public API limiter
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window per key
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,

    /// Window size in seconds
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,

    /// Requests allowed on the login route per window
    #[serde(default = "default_login_max_requests")]
    pub login_max_requests: u32,

    /// Login window size in seconds
    #[serde(default = "default_login_window_secs")]
    pub login_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_requests: default_rate_max_requests(),
            window_secs: default_rate_window_secs(),
            login_max_requests: default_login_max_requests(),
            login_window_secs: default_login_window_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_max_requests() -> u32 {
    120
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_login_max_requests() -> u32 {
    5
}

fn default_login_window_secs() -> u64 {
    300
}

/// Automation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Soft deadline per module run, in seconds
    #[serde(default = "default_soft_deadline_secs")]
    pub soft_deadline_secs: u64,

    /// Timeout for the webhook module action, in seconds
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            soft_deadline_secs: default_soft_deadline_secs(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_soft_deadline_secs() -> u64 {
    60
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

/// Notification dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Sliding dedup window for in-app rows, in seconds
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Outbound email channel
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Outbound SMS channel
    #[serde(default)]
    pub sms: SmsConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            smtp: SmtpConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

fn default_dedup_window_secs() -> u64 {
    60
}

/// SMTP relay configuration for the email channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_hostname")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Relay username
    pub username: Option<String>,

    /// Relay password
    pub password: Option<String>,

    /// From address for notification mail
    #[serde(default = "default_smtp_from")]
    pub from_address: String,

    /// Use STARTTLS
    #[serde(default = "default_true")]
    pub use_starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_hostname(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_smtp_from(),
            use_starttls: default_true(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "noreply@localhost".to_string()
}

/// SMS gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsConfig {
    /// Gateway endpoint; SMS delivery is disabled when unset
    pub endpoint: Option<String>,

    /// Gateway API token
    pub api_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_sms_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sms_timeout_secs() -> u64 {
    30
}

/// MCP (JSON-RPC) module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Enable the JSON-RPC endpoint
    #[serde(default)]
    pub enabled: bool,

    /// SHA-256 hex digest of the shared bearer secret
    #[serde(default)]
    pub secret_sha256: String,

    /// Tool names exposed through listTools/callTool
    #[serde(default = "default_mcp_tools")]
    pub tools: Vec<String>,

    /// Gate for the updateTicket tool
    #[serde(default)]
    pub allow_ticket_updates: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_sha256: String::new(),
            tools: default_mcp_tools(),
            allow_ticket_updates: false,
        }
    }
}

fn default_mcp_tools() -> Vec<String> {
    vec![
        "listTickets".to_string(),
        "getTicket".to_string(),
        "addReply".to_string(),
    ]
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/opsdesk/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// Environment variables win over file values; secrets are usually
    /// injected this way rather than written to disk.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(secret) = std::env::var("OPSDESK_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Ok(key) = std::env::var("OPSDESK_TOTP_KEY") {
            self.session.totp_encryption_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.hostname, "localhost");
        assert_eq!(server.bind_address, "0.0.0.0");

        let tickets = TicketConfig::default();
        assert_eq!(tickets.terminal_statuses, vec!["closed", "resolved"]);

        let mcp = McpConfig::default();
        assert!(!mcp.enabled);
        assert!(!mcp.allow_ticket_updates);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "portal.example.com"

[database]
backend = "postgres"
url = "postgres://localhost/opsdesk"

[tickets]
terminal_statuses = ["done"]

[mcp]
enabled = true
secret_sha256 = "abc123"
tools = ["listTickets", "getTicket", "updateTicket"]
allow_ticket_updates = true
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "portal.example.com");
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/opsdesk")
        );
        assert_eq!(config.tickets.terminal_statuses, vec!["done"]);
        assert!(config.mcp.enabled);
        assert!(config.mcp.allow_ticket_updates);
        assert_eq!(config.rate_limit.max_requests, 120);
        assert_eq!(config.notifications.dedup_window_secs, 60);
    }
}
