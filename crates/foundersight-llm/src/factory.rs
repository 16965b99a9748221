// Provider client factory
//
// Explicit factory for building chat clients from provider configuration,
// with a time-boxed cache: a client is constructed once and reused until the
// TTL elapses or the cache is explicitly invalidated (e.g. after an operator
// rotates the API key).
//
// IMPORTANT: API keys must be provided in the config. This factory does NOT
// read from environment variables. Keys should be decrypted from the vault
// and passed via ProviderConfig.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::client::ChatClient;
use crate::error::{ProviderError, ProviderResult};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/chat/completions";

/// How long a cached client is reused before being rebuilt
const DEFAULT_CLIENT_TTL: Duration = Duration::from_secs(300);

/// Provider type enumeration matching the platform's provider settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    AzureOpenAI,
}

impl ProviderType {
    /// Default OpenAI-compatible completions URL for this provider.
    /// Azure has no default - the deployment URL must be supplied.
    fn default_api_url(self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some(OPENAI_API_URL),
            ProviderType::Anthropic => Some(ANTHROPIC_API_URL),
            ProviderType::AzureOpenAI => None,
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "azure_openai" => Ok(ProviderType::AzureOpenAI),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::AzureOpenAI => write!(f, "azure_openai"),
        }
    }
}

/// Configuration for building a provider client
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Type of provider
    pub provider_type: ProviderType,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Completions URL override (optional, required for Azure)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Create a new provider config
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the completions URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

struct CachedClient {
    client: Arc<ChatClient>,
    built_at: Instant,
}

/// Factory with a time-boxed client cache
///
/// # Example
///
/// ```ignore
/// use foundersight_llm::{ProviderConfig, ProviderFactory, ProviderType};
///
/// let config = ProviderConfig::new(ProviderType::OpenAI).with_api_key(decrypted_key);
/// let factory = ProviderFactory::new(config);
/// let client = factory.client()?;   // built once, reused until the TTL elapses
/// factory.invalidate();             // force a rebuild on the next call
/// ```
pub struct ProviderFactory {
    config: ProviderConfig,
    ttl: Duration,
    cached: Mutex<Option<CachedClient>>,
}

impl ProviderFactory {
    /// Create a factory for the given provider configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            ttl: DEFAULT_CLIENT_TTL,
            cached: Mutex::new(None),
        }
    }

    /// Override the cache TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get the cached client, rebuilding it if the TTL has elapsed
    pub fn client(&self) -> ProviderResult<Arc<ChatClient>> {
        let mut slot = self.cached.lock().unwrap();

        if let Some(cached) = slot.as_ref() {
            if cached.built_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.client));
            }
        }

        tracing::debug!(provider = %self.config.provider_type, "building provider client");
        let client = Arc::new(self.build()?);
        *slot = Some(CachedClient {
            client: Arc::clone(&client),
            built_at: Instant::now(),
        });
        Ok(client)
    }

    /// Drop the cached client so the next call rebuilds it
    pub fn invalidate(&self) {
        let mut slot = self.cached.lock().unwrap();
        if slot.take().is_some() {
            tracing::info!(provider = %self.config.provider_type, "provider client cache invalidated");
        }
    }

    fn build(&self) -> ProviderResult<ChatClient> {
        // API key is required - it should be decrypted from the vault
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ProviderError::transport(
                "API key is required. Configure the API key in provider settings.",
            )
        })?;

        let api_url = match &self.config.base_url {
            Some(url) => url.clone(),
            None => self
                .config
                .provider_type
                .default_api_url()
                .ok_or_else(|| {
                    ProviderError::transport(format!(
                        "provider {} requires an explicit base URL",
                        self.config.provider_type
                    ))
                })?
                .to_string(),
        };

        ChatClient::with_base_url(api_key, api_url)
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("provider_type", &self.config.provider_type)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(
            "openai".parse::<ProviderType>().unwrap(),
            ProviderType::OpenAI
        );
        assert_eq!(
            "anthropic".parse::<ProviderType>().unwrap(),
            ProviderType::Anthropic
        );
        assert_eq!(
            "azure_openai".parse::<ProviderType>().unwrap(),
            ProviderType::AzureOpenAI
        );
        assert!("ollama".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new(ProviderType::Anthropic)
            .with_api_key("test-key")
            .with_base_url("https://custom.api.com");

        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert_eq!(config.api_key, Some("test-key".to_string()));
        assert_eq!(config.base_url, Some("https://custom.api.com".to_string()));
    }

    #[test]
    fn test_factory_requires_api_key() {
        let factory = ProviderFactory::new(ProviderConfig::new(ProviderType::OpenAI));
        assert!(factory.client().is_err());

        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::OpenAI).with_api_key("test-key"),
        );
        assert!(factory.client().is_ok());
    }

    #[test]
    fn test_azure_requires_base_url() {
        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::AzureOpenAI).with_api_key("test-key"),
        );
        assert!(factory.client().is_err());

        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::AzureOpenAI)
                .with_api_key("test-key")
                .with_base_url("https://example.azure.com/deployment/chat/completions"),
        );
        assert!(factory.client().is_ok());
    }

    #[test]
    fn test_client_is_cached_within_ttl() {
        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::OpenAI).with_api_key("test-key"),
        );
        let first = factory.client().unwrap();
        let second = factory.client().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::OpenAI).with_api_key("test-key"),
        );
        let first = factory.client().unwrap();
        factory.invalidate();
        let second = factory.client().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_expired_ttl_forces_rebuild() {
        let factory = ProviderFactory::new(
            ProviderConfig::new(ProviderType::OpenAI).with_api_key("test-key"),
        )
        .with_ttl(Duration::ZERO);
        let first = factory.client().unwrap();
        let second = factory.client().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
