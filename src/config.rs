use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ResqError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;

/// Worker output verbosity, as selected by the `LOGGING`/`VERBOSE`/`VVERBOSE` switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    None,
    Normal,
    Verbose,
}

impl LogLevel {
    /// `LOGGING` and `VERBOSE` take precedence over `VVERBOSE`.
    pub fn from_flags(logging: bool, verbose: bool, very_verbose: bool) -> Self {
        if logging || verbose {
            LogLevel::Normal
        } else if very_verbose {
            LogLevel::Verbose
        } else {
            LogLevel::None
        }
    }

    /// Default `EnvFilter` directive used when `RUST_LOG` is not set.
    pub fn filter(&self) -> &'static str {
        match self {
            LogLevel::None => "warn",
            LogLevel::Normal => "info",
            LogLevel::Verbose => "debug",
        }
    }
}

/// A single store node: `host:port`, optionally named with `alias=host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
    pub alias: Option<String>,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (alias, addr) = match s.split_once('=') {
            Some((alias, addr)) => (Some(alias.trim().to_string()), addr.trim()),
            None => (None, s),
        };

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ResqError::InvalidBackend(s.to_string()))?;
                (host, port)
            }
            None => (addr, DEFAULT_PORT),
        };

        if host.is_empty() || alias.as_deref() == Some("") {
            return Err(ResqError::InvalidBackend(s.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            alias,
        })
    }

    pub fn redis_url(&self, database: i64) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, database)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}={}:{}", alias, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Where the store lives.
///
/// A comma-separated list (or any entry carrying an alias) selects the
/// consistent-hash cluster router; everything else is a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Tcp(NodeAddr),
    Unix(PathBuf),
    Url(String),
    Cluster(Vec<NodeAddr>),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Tcp(NodeAddr::new(DEFAULT_HOST, DEFAULT_PORT))
    }
}

impl BackendConfig {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        if s.starts_with("redis://") || s.starts_with("rediss://") {
            return Ok(BackendConfig::Url(s.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ResqError::InvalidBackend(s.to_string()));
            }
            return Ok(BackendConfig::Unix(PathBuf::from(path)));
        }

        if s.contains(',') || s.contains('=') {
            let nodes = s
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(NodeAddr::parse)
                .collect::<Result<Vec<_>>>()?;
            if nodes.is_empty() {
                return Err(ResqError::EmptyCluster);
            }
            return Ok(BackendConfig::Cluster(nodes));
        }

        Ok(BackendConfig::Tcp(NodeAddr::parse(s)?))
    }

    /// Connection URL for single-node backends. `None` for clusters.
    pub fn connection_url(&self, database: i64) -> Option<String> {
        match self {
            BackendConfig::Tcp(node) => Some(node.redis_url(database)),
            BackendConfig::Unix(path) => {
                Some(format!("redis+unix://{}?db={}", path.display(), database))
            }
            BackendConfig::Url(url) => Some(url.clone()),
            BackendConfig::Cluster(_) => None,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, BackendConfig::Cluster(_))
    }
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Tcp(node) => write!(f, "{}", node),
            BackendConfig::Unix(path) => write!(f, "unix:{}", path.display()),
            BackendConfig::Url(url) => write!(f, "{}", url),
            BackendConfig::Cluster(nodes) => {
                let parts: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// Everything a worker process needs to boot.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues in priority order. `*` means every known queue, alphabetically.
    pub queues: Vec<String>,
    pub backend: BackendConfig,
    pub database: i64,
    pub log_level: LogLevel,
    /// How long to sleep when no job was found.
    pub interval: Duration,
    /// Number of worker processes to run.
    pub count: usize,
    pub pid_file: Option<PathBuf>,
    /// Kill a job's child process after this long. `None` waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: vec!["default".to_string()],
            backend: BackendConfig::default(),
            database: 0,
            log_level: LogLevel::default(),
            interval: Duration::from_secs(5),
            count: 1,
            pid_file: None,
            job_timeout: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(queues: Vec<String>) -> Self {
        Self {
            queues,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Split a `QUEUE`-style list into queue names.
pub fn parse_queues(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}
