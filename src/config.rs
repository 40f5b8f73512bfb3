//! Client configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::json::JsonCodec;

pub const TEST_BASE_URL: &str = "https://blagajne-test.fu.gov.si:9002/v1";
pub const PRODUCTION_BASE_URL: &str = "https://blagajne.fu.gov.si:9003/v1";

/// OU that marks the client certificate in a test bundle
pub const TEST_CLIENT_CERT_OU: &str = "DavPotRacTEST";
/// OU that marks the client certificate in a production bundle
pub const PRODUCTION_CLIENT_CERT_OU: &str = "DavPotRac";

const ECHO_PATH: &str = "/cash_registers/echo";
const INVOICES_PATH: &str = "/cash_registers/invoices";
const BUSINESS_PREMISES_PATH: &str = "/cash_registers/invoices/register";
const BATCH_INVOICES_PATH: &str = "/cash_registers_batch/invoices";

/// Which FURS deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!(
                "unknown FURS environment {:?}, expected test or production",
                other
            ))),
        }
    }
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Test => TEST_BASE_URL,
            Environment::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn client_cert_ou(self) -> &'static str {
        match self {
            Environment::Test => TEST_CLIENT_CERT_OU,
            Environment::Production => PRODUCTION_CLIENT_CERT_OU,
        }
    }
}

/// Endpoint URLs of one FURS deployment plus its client-certificate marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FursEnv {
    echo: Url,
    invoices: Url,
    business_premises: Url,
    batch_invoices: Url,
    client_cert_ou: String,
}

impl FursEnv {
    /// Endpoints under `base_url`, e.g. `https://host:port/v1`
    pub fn new(base_url: &str, client_cert_ou: impl Into<String>) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |path: &str| {
            Url::parse(&format!("{}{}", base, path))
                .map_err(|e| Error::Config(format!("Invalid FURS base URL {:?}: {}", base_url, e)))
        };

        Ok(Self {
            echo: endpoint(ECHO_PATH)?,
            invoices: endpoint(INVOICES_PATH)?,
            business_premises: endpoint(BUSINESS_PREMISES_PATH)?,
            batch_invoices: endpoint(BATCH_INVOICES_PATH)?,
            client_cert_ou: client_cert_ou.into(),
        })
    }

    pub fn test() -> Result<Self> {
        Self::new(TEST_BASE_URL, TEST_CLIENT_CERT_OU)
    }

    pub fn production() -> Result<Self> {
        Self::new(PRODUCTION_BASE_URL, PRODUCTION_CLIENT_CERT_OU)
    }

    pub fn echo_url(&self) -> &Url {
        &self.echo
    }

    pub fn invoices_url(&self) -> &Url {
        &self.invoices
    }

    pub fn business_premises_url(&self) -> &Url {
        &self.business_premises
    }

    /// Batch submission endpoint; no client operation uses it
    pub fn batch_invoices_url(&self) -> &Url {
        &self.batch_invoices
    }

    pub fn client_cert_ou(&self) -> &str {
        &self.client_cert_ou
    }
}

/// Settings needed to build a [`FursClient`](crate::FursClient)
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Overrides the environment's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// PEM bundle with the client certificate, its CA chain and private key
    pub bundle_path: PathBuf,

    /// Password of the encrypted private key
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Extra PEM files with trusted server CAs
    #[serde(default)]
    pub trust_roots: Vec<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Indent request JSON
    #[serde(default)]
    pub pretty_json: bool,
}

fn default_timeout() -> u64 {
    30
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("bundle_path", &self.bundle_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("trust_roots", &self.trust_roots)
            .field("timeout_secs", &self.timeout_secs)
            .field("pretty_json", &self.pretty_json)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(environment: Environment, bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            environment,
            base_url: None,
            bundle_path: bundle_path.into(),
            password: None,
            trust_roots: Vec::new(),
            timeout_secs: default_timeout(),
            pretty_json: false,
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `FURS_BUNDLE` | PEM bundle path (required) |
    /// | `FURS_PASSWORD` | Private key password |
    /// | `FURS_ENV` | `test` (default) or `production` |
    /// | `FURS_BASE_URL` | Base URL override |
    /// | `FURS_TRUST_ROOTS` | Extra CA files, separated like `PATH` |
    /// | `FURS_TIMEOUT` | Request timeout in seconds, greater than zero (default 30) |
    /// | `FURS_PRETTY_JSON` | `1` or `true` to indent request JSON |
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bundle_path = var("FURS_BUNDLE")
            .ok_or_else(|| Error::Config("FURS_BUNDLE is not set".into()))?;

        let environment = match var("FURS_ENV") {
            Some(env) => env.parse()?,
            None => Environment::default(),
        };

        let mut config = Self::new(environment, bundle_path);
        config.password = var("FURS_PASSWORD");
        config.base_url = var("FURS_BASE_URL");
        config.trust_roots = var("FURS_TRUST_ROOTS")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        if let Some(timeout) = var("FURS_TIMEOUT") {
            config.timeout_secs = match timeout.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(Error::Config(format!(
                        "FURS_TIMEOUT must be a positive number of seconds, got {:?}",
                        timeout
                    )))
                }
            };
        }
        config.pretty_json = var("FURS_PRETTY_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(config)
    }

    /// Parse a JSON config file body
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_trust_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_roots.push(path.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }

    /// Endpoints and certificate marker for the configured environment
    pub fn furs_env(&self) -> Result<FursEnv> {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url());
        FursEnv::new(base, self.environment.client_cert_ou())
    }

    pub fn json_codec(&self) -> JsonCodec {
        if self.pretty_json {
            JsonCodec::pretty()
        } else {
            JsonCodec::compact()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
