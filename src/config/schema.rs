use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_PROVIDER: &str = "openrouter";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite";

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "SUPPORTDESK_CONFIG_DIR";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level supportdesk configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` / `SUPPORTDESK_CONFIG_DIR` → `~/.supportdesk/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the selected provider. Overridden by `SUPPORTDESK_API_KEY` or `API_KEY`.
    pub api_key: Option<String>,
    /// Base URL override for the provider API.
    pub api_url: Option<String>,
    /// Provider ID (`openai`, `openrouter`, `portkey`, `custom:<URL>`). Default: `"openrouter"`.
    pub default_provider: Option<String>,
    /// Model routed through the selected provider.
    pub default_model: Option<String>,
    /// Model temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    /// Seconds before a generation call is abandoned. Default: `60`.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Escalation policy (`[escalation]`).
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Gateway server configuration: host, port, bearer tokens (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_provider_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            api_key: None,
            api_url: None,
            default_provider: Some(DEFAULT_PROVIDER.to_string()),
            default_model: Some(DEFAULT_MODEL.to_string()),
            default_temperature: default_temperature(),
            provider_timeout_secs: default_provider_timeout_secs(),
            escalation: EscalationConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Escalation policy (`[escalation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Resolution attempts allowed before a ticket is drafted. Default: `2`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 8000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Bearer tokens accepted on `/api/*`. Empty disables the check.
    #[serde(default)]
    pub api_tokens: Vec<String>,
    /// Whole-request timeout; keep above `provider_timeout_secs`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            api_tokens: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var(CONFIG_DIR_ENV)
        .ok()
        .and_then(|raw| config_dir_override(&raw))
    {
        return Ok(dir);
    }

    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".supportdesk"))
}

/// Tilde-expanded `--config-dir` / `SUPPORTDESK_CONFIG_DIR` value; blank means unset.
fn config_dir_override(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(PathBuf::from(shellexpand::tilde(raw).as_ref()))
}

impl Config {
    /// Load `config.toml` from the default directory, writing defaults on first run.
    pub async fn load_or_init() -> Result<Self> {
        let dir = default_config_dir()?;
        Self::load_or_init_in(&dir).await
    }

    /// Load `config.toml` from `dir`, writing defaults on first run.
    pub async fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.escalation.max_attempts == 0 {
            anyhow::bail!("escalation.max_attempts must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!(
                "default_temperature must be between 0.0 and 2.0 (got {})",
                self.default_temperature
            );
        }
        if self.provider_timeout_secs == 0 {
            anyhow::bail!("provider_timeout_secs must be greater than 0");
        }
        if self.gateway.request_timeout_secs <= self.provider_timeout_secs {
            tracing::warn!(
                request_timeout_secs = self.gateway.request_timeout_secs,
                provider_timeout_secs = self.provider_timeout_secs,
                "gateway.request_timeout_secs should exceed provider_timeout_secs"
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(*name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = first(&["SUPPORTDESK_API_KEY", "API_KEY"]) {
            self.api_key = Some(key);
        }
        if let Some(provider) = first(&["SUPPORTDESK_PROVIDER"]) {
            self.default_provider = Some(provider);
        }
        if let Some(model) = first(&["SUPPORTDESK_MODEL"]) {
            self.default_model = Some(model);
        }
        if let Some(url) = first(&["SUPPORTDESK_API_URL"]) {
            self.api_url = Some(url);
        }
        if let Some(host) = first(&["SUPPORTDESK_GATEWAY_HOST"]) {
            self.gateway.host = host;
        }
        if let Some(port) = first(&["SUPPORTDESK_GATEWAY_PORT", "PORT"]) {
            match port.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(port = %port, "Ignoring invalid gateway port override"),
            }
        }
        if let Some(tokens) = first(&["SUPPORTDESK_API_TOKENS"]) {
            self.gateway.api_tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(max) = first(&["SUPPORTDESK_MAX_ATTEMPTS"]) {
            match max.parse::<u32>() {
                Ok(max) if max > 0 => self.escalation.max_attempts = max,
                _ => tracing::warn!(value = %max, "Ignoring invalid SUPPORTDESK_MAX_ATTEMPTS"),
            }
        }
        if let Some(temp) = first(&["SUPPORTDESK_TEMPERATURE"]) {
            if let Ok(temp) = temp.parse::<f64>() {
                if (0.0..=2.0).contains(&temp) {
                    self.default_temperature = temp;
                }
            }
        }
    }

    /// Write config atomically: temp file in the same directory, then rename.
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write config")?;
        temp_file.sync_all().await.context("Failed to sync config")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e).with_context(|| {
                format!("Failed to replace {}", self.config_path.display())
            });
        }

        Ok(())
    }

    /// Copy with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("***MASKED***".into());
        }
        copy.gateway.api_tokens = copy
            .gateway
            .api_tokens
            .iter()
            .map(|_| "***MASKED***".to_string())
            .collect();
        copy
    }
}
