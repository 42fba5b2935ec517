use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid quiz api url {base_url:?}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("quiz api url {base_url} cannot carry a path");
        }
        Ok(Self {
            base_url,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base = env_non_empty("QUIZ_API_BASE_URL").context("QUIZ_API_BASE_URL is not set")?;
        let mut config = Self::new(&base)?;
        config.token = env_non_empty("QUIZ_API_TOKEN");
        if let Some(secs) = env_non_empty("QUIZ_API_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("QUIZ_API_TIMEOUT_SECS must be a number, got {secs:?}"))?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// `base_url` joined with `/api/v1/` and the given path segments, keeping
    /// any prefix the base carries. Each segment is percent-encoded on its own.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rules out cannot-be-a-base urls
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").push("v1").extend(segments);
        }
        url
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub local_state_path: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            local_state_path: None,
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = env_non_empty("BACKEND_HOST").unwrap_or(defaults.host);
        let port = env_non_empty("BACKEND_PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.port);
        let allowed_origins = env_non_empty("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);
        Self {
            host,
            port,
            local_state_path: env_non_empty("LOCAL_STATE_PATH"),
            allowed_origins,
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
