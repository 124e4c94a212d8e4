//! Configuration schema definitions.
//!
//! One TOML file drives both tiers. The edge proxy reads `[edge]`, the
//! compile backend reads `[backend]`, and both share `[observability]`.
//! All types derive Serde traits and every field has a default, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// TLS-terminating edge proxy.
    pub edge: EdgeConfig,

    /// Compile backend service.
    pub backend: BackendConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Edge proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EdgeConfig {
    /// Bind address (e.g., "0.0.0.0:443").
    pub bind_address: String,

    /// Optional TLS configuration. Plain HTTP is served when absent.
    pub tls: Option<TlsConfig>,

    /// Base URL of the backend requests are forwarded to.
    pub upstream: String,

    /// Value of `X-Forwarded-Proto`. Derived from the TLS setting when unset.
    pub forwarded_proto: Option<String>,

    /// Maximum concurrent forwarded requests (backpressure).
    pub max_connections: usize,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Timeouts towards the upstream.
    pub timeouts: TimeoutConfig,

    /// Preflight response policy.
    pub cors: CorsConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:443".to_string(),
            tls: None,
            upstream: "http://127.0.0.1:8080".to_string(),
            forwarded_proto: None,
            max_connections: 10_000,
            max_body_size: 1024 * 1024,
            timeouts: TimeoutConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl EdgeConfig {
    /// The scheme reported to the backend in `X-Forwarded-Proto`.
    pub fn effective_forwarded_proto(&self) -> &str {
        match (&self.forwarded_proto, &self.tls) {
            (Some(proto), _) => proto,
            (None, Some(_)) => "https",
            (None, None) => "http",
        }
    }
}

/// TLS configuration for the edge listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeouts applied to upstream calls, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect_secs: u64,

    /// Time allowed for the upstream to produce response headers.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            upstream_secs: 60,
        }
    }
}

/// Headers returned for every `OPTIONS` request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: ["GET", "POST", "OPTIONS", "PUT", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: ["Content-Type", "X-Requested-With"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_age_secs: 86_400,
        }
    }
}

/// Backend CORS flavour.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    /// Answers preflights itself and stamps CORS headers on every response.
    #[default]
    Local,
    /// Runs behind the edge proxy with origin-mirroring CORS handling.
    Https,
}

impl std::str::FromStr for BackendVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "https" => Ok(Self::Https),
            other => Err(format!("unknown variant '{}', expected 'local' or 'https'", other)),
        }
    }
}

/// Compile backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// CORS flavour.
    pub variant: BackendVariant,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Timeout in seconds for lookups; `/compile` is bounded by `compiler.timeout_secs`.
    pub request_timeout_secs: u64,

    /// External compiler settings.
    pub compiler: CompilerConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            variant: BackendVariant::default(),
            max_body_size: 2 * 1024 * 1024,
            request_timeout_secs: 120,
            compiler: CompilerConfig::default(),
        }
    }
}

/// External Vyper compiler invocation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Standard-JSON compiler program, fed on stdin.
    pub program: String,

    /// Program queried with `--version` for the banner.
    pub version_program: String,

    /// Maximum concurrent compiler processes.
    pub max_concurrent: usize,

    /// Per-compilation timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "vyper-json".to_string(),
            version_program: "vyper".to_string(),
            max_concurrent: 4,
            timeout_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "vyper_server=info,vyper_edge=info,vyper_backend=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
