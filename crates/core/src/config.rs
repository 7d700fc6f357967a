use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub proxy: ProxyConfig,
    pub forwarding: ForwardingConfig,
    pub mail: MailConfig,
    pub signup: SignupConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Directory where credential artifacts are written.
    pub data_dir: String,
    pub attempts: usize,
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    pub pool_dir: String,
    pub usage_file: String,
    pub max_usage: u32,
    /// Abort an attempt when no eligible proxy remains instead of
    /// proceeding without one.
    pub require_proxy: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForwardingConfig {
    pub api_base: String,
    pub zone_id: String,
    pub auth_email: String,
    pub auth_key: String,
    /// Domain the forwarding rules receive on.
    pub rules_domain: String,
    /// Real inbox every disposable address forwards into.
    pub target_mail: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub gateway_url: String,
    pub mailbox: String,
    pub access_token: String,
    pub poll_attempts: u32,
    pub poll_interval_seconds: u64,
    /// How many of the newest messages each sweep inspects.
    #[serde(default = "default_recent_count")]
    pub recent_count: usize,
    /// Grace period before the first sweep, lets the message arrive.
    #[serde(default = "default_grace")]
    pub initial_grace_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignupConfig {
    pub url: String,
    /// Subject must contain this marker for a message to count.
    pub subject_marker: String,
    /// Confirmation links must start with this prefix.
    pub link_prefix: String,
    /// Cookie holding the primary session token.
    pub token_cookie: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub find_timeout_seconds: u64,
    /// Shorter budget for optional elements (e.g. the alternate-flow toggle).
    #[serde(default = "default_optional_timeout")]
    pub optional_find_timeout_seconds: u64,
    pub interact_retries: u32,
    pub humanize_typing: bool,
    pub think_delay_min_seconds: u64,
    pub think_delay_max_seconds: u64,
    /// Optional selector override file; compiled-in defaults otherwise.
    #[serde(default)]
    pub selector_file: Option<String>,
}

fn default_recent_count() -> usize {
    20
}

fn default_grace() -> u64 {
    5
}

fn default_optional_timeout() -> u64 {
    10
}
