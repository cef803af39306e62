use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::AccountId, errors::Error, transport::paced::PacingConfig, Result};

/// Which transport backs the clone jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// HTTP session gateway in front of an MTProto client.
    Gateway,
    /// In-process fake channels (local dry runs).
    Memory,
}

/// Pacing defaults applied to a clone request when the client does not override them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloneDefaults {
    pub page_size: u32,
    pub max_page_size: u32,
    pub send_delay: Duration,
    pub fetch_delay: Duration,
    pub cooldown_every: u64,
    pub cooldown: Duration,
    pub max_throttle_retries: Option<u32>,
}

impl Default for CloneDefaults {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_page_size: 100,
            send_delay: Duration::from_millis(1500),
            fetch_delay: Duration::from_millis(500),
            cooldown_every: 1000,
            cooldown: Duration::from_secs(1800),
            max_throttle_retries: None,
        }
    }
}

/// Typed configuration for the cloner service.
#[derive(Clone, Debug)]
pub struct Config {
    // HTTP
    pub bind_addr: SocketAddr,

    // Transport
    pub transport: TransportKind,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub gateway_timeout: Duration,
    pub default_account: Option<AccountId>,
    /// Seed file for the memory transport.
    pub memory_seed: Option<PathBuf>,

    // Clone pacing
    pub clone: CloneDefaults,
    pub pacing: PacingConfig,

    // Job bookkeeping
    pub job_retention: Option<Duration>,

    // Logging
    pub log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let bind_addr = get("TGC_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_addr: SocketAddr = bind_addr
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid TGC_BIND_ADDR {bind_addr:?}: {e}")))?;

        let transport = match get("TGC_TRANSPORT")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("gateway") => TransportKind::Gateway,
            Some("memory") => TransportKind::Memory,
            Some(other) => {
                return Err(Error::Config(format!(
                    "unknown TGC_TRANSPORT {other:?} (expected gateway or memory)"
                )))
            }
        };

        let gateway_url = get("TGC_GATEWAY_URL").map(|s| s.trim().trim_end_matches('/').to_string());
        if transport == TransportKind::Gateway && gateway_url.is_none() {
            return Err(Error::Config(
                "TGC_GATEWAY_URL environment variable is required for the gateway transport"
                    .to_string(),
            ));
        }
        let gateway_token = get("TGC_GATEWAY_TOKEN");
        let gateway_timeout =
            Duration::from_millis(parse_u64(&get, "TGC_GATEWAY_TIMEOUT_MS")?.unwrap_or(30_000));
        let default_account = get("TGC_DEFAULT_ACCOUNT").map(|s| AccountId(s.trim().to_string()));
        let memory_seed = get("TGC_MEMORY_SEED").map(|s| PathBuf::from(s.trim()));

        let defaults = CloneDefaults::default();
        let max_page_size = parse_u32(&get, "TGC_MAX_PAGE_SIZE")?.unwrap_or(defaults.max_page_size);
        let page_size = parse_u32(&get, "TGC_PAGE_SIZE")?.unwrap_or(defaults.page_size);
        if page_size == 0 || max_page_size == 0 {
            return Err(Error::Config("page sizes must be > 0".to_string()));
        }
        if page_size > max_page_size {
            return Err(Error::Config(format!(
                "TGC_PAGE_SIZE ({page_size}) exceeds TGC_MAX_PAGE_SIZE ({max_page_size})"
            )));
        }

        let clone = CloneDefaults {
            page_size,
            max_page_size,
            send_delay: parse_u64(&get, "TGC_SEND_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_delay),
            fetch_delay: parse_u64(&get, "TGC_FETCH_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_delay),
            cooldown_every: parse_u64(&get, "TGC_COOLDOWN_EVERY")?
                .unwrap_or(defaults.cooldown_every),
            cooldown: parse_u64(&get, "TGC_COOLDOWN_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
            max_throttle_retries: parse_u32(&get, "TGC_MAX_THROTTLE_RETRIES")?,
        };

        let default_pacing = PacingConfig::default();
        let pacing = PacingConfig {
            global_min_interval: parse_u64(&get, "TGC_GLOBAL_MIN_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(default_pacing.global_min_interval),
            per_channel_min_interval: parse_u64(&get, "TGC_PER_CHANNEL_MIN_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(default_pacing.per_channel_min_interval),
        };

        let job_retention = parse_u64(&get, "TGC_JOB_RETENTION_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let log_json = get("TGC_LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        Ok(Self {
            bind_addr,
            transport,
            gateway_url,
            gateway_token,
            gateway_timeout,
            default_account,
            memory_seed,
            clone,
            pacing,
            job_retention,
            log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid {key} {s:?}: {e}")))
        })
        .transpose()
}

fn parse_u32(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u32>> {
    get(key)
        .map(|s| {
            s.trim()
                .parse::<u32>()
                .map_err(|e| Error::Config(format!("invalid {key} {s:?}: {e}")))
        })
        .transpose()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
