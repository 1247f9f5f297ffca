use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBackend {
    Mock,
    Gateway,
}

#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub api_key: String,
    pub secret_key: String,
    pub api_url: String,
    pub gateway_url: String,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub backend: ChainBackend,
    pub gateway_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub frontend_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub nonce_ttl: Duration,
    pub janitor_interval: Duration,
    pub upload_limit_bytes: usize,
    pub chain: ChainConfig,
    pub pinata: Option<PinataConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let listen_addr: SocketAddr = env::var("SENTRIX_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()
            .context("invalid SENTRIX_ADDR")?;

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());
        url::Url::parse(&frontend_url).context("FRONTEND_URL must be a valid URL")?;

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters");
        }

        let upload_limit_bytes = env::var("UPLOAD_LIMIT_BYTES")
            .unwrap_or_else(|_| (50 * 1024 * 1024).to_string())
            .parse()
            .context("UPLOAD_LIMIT_BYTES must be an integer number of bytes")?;

        Ok(Self {
            listen_addr,
            frontend_url,
            redis_url: optional("REDIS_URL"),
            jwt_secret,
            jwt_ttl: parse_duration("JWT_TTL_SECONDS", 24 * 60 * 60)?,
            nonce_ttl: parse_duration("NONCE_TTL_SECONDS", 5 * 60)?,
            janitor_interval: parse_duration("JANITOR_SECONDS", 30)?,
            upload_limit_bytes,
            chain: chain_from_env()?,
            pinata: pinata_from_env(),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn janitor_interval(&self) -> Duration {
        self.janitor_interval
    }
}

fn chain_from_env() -> Result<ChainConfig> {
    let backend = match env::var("CHAIN_BACKEND")
        .unwrap_or_else(|_| "mock".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "mock" => ChainBackend::Mock,
        "gateway" => ChainBackend::Gateway,
        other => bail!("unknown CHAIN_BACKEND {other}, expected mock or gateway"),
    };

    let gateway_url = optional("CHAIN_GATEWAY_URL");
    if backend == ChainBackend::Gateway && gateway_url.is_none() {
        bail!("CHAIN_GATEWAY_URL is required when CHAIN_BACKEND=gateway");
    }

    Ok(ChainConfig {
        backend,
        gateway_url,
        timeout: parse_duration("CHAIN_TIMEOUT_SECONDS", 30)?,
    })
}

fn pinata_from_env() -> Option<PinataConfig> {
    let api_key = optional("PINATA_API_KEY")?;
    let secret_key = optional("PINATA_SECRET_KEY")?;

    Some(PinataConfig {
        api_key,
        secret_key,
        api_url: env::var("PINATA_API_URL")
            .unwrap_or_else(|_| "https://api.pinata.cloud".to_string()),
        gateway_url: env::var("PINATA_GATEWAY_URL")
            .unwrap_or_else(|_| "https://gateway.pinata.cloud/ipfs/".to_string()),
    })
}

fn optional(env_key: &str) -> Option<String> {
    env::var(env_key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_duration(env_key: &str, default_secs: u64) -> Result<Duration> {
    let raw = env::var(env_key).unwrap_or_else(|_| default_secs.to_string());
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("{env_key} must be an integer number of seconds"))?;

    Ok(Duration::from_secs(secs))
}
