//! Instance configuration.
//!
//! An [`Instance`] is a named bundle of policy shared by every request that
//! references it: success codes, retry rules, the timeout ladder, a base
//! path, default headers and a cancellation handle. Instances are built
//! from [`InstanceOptions`], where every field is optional and absent
//! fields take the built-in defaults.

use crate::action::RetryRule;
use crate::error::Result;
use fletch_core::{HeaderSet, SuccessCode, DEFAULT_INSTANCE};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-tier timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default number of retry tiers before the final timeout.
pub const DEFAULT_MAX_RETRY_TIERS: u32 = 2;

/// Status codes that get the built-in resend rule.
pub const DEFAULT_RETRY_CODES: [u16; 3] = [408, 429, 504];

/// The default success specifiers: any 2xx.
pub fn default_success_codes() -> Vec<SuccessCode> {
    vec![SuccessCode::from("200-299")]
}

/// The default retry rules: resend once on 408, 429 and 504.
pub fn default_retry_rules() -> Vec<RetryRule> {
    DEFAULT_RETRY_CODES.into_iter().map(RetryRule::resend).collect()
}

/// Fully resolved configuration of an instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Specifiers a status must match to count as success.
    pub success_codes: Vec<SuccessCode>,
    /// Instance-wide retry rules.
    pub retry_rules: Vec<RetryRule>,
    /// Per-tier timeout. Zero disables the timeout ladder.
    pub timeout: Duration,
    /// Number of abort-and-resend tiers before the final timeout.
    pub max_retry_tiers: u32,
    /// Prefix applied to request paths.
    pub base_path: String,
    /// Headers merged under each request's own headers.
    pub headers: HeaderSet,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            success_codes: default_success_codes(),
            retry_rules: default_retry_rules(),
            timeout: DEFAULT_TIMEOUT,
            max_retry_tiers: DEFAULT_MAX_RETRY_TIERS,
            base_path: String::new(),
            headers: HeaderSet::new(),
        }
    }
}

/// Partial instance configuration.
///
/// Retry rules carry behaviour and are skipped by serde; everything else can
/// be loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceOptions {
    /// Instance name. `None` means the default instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,

    /// Success specifiers. Entries that are neither integers nor strings
    /// are dropped on load, since they could never match.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_codes::deserialize"
    )]
    pub success_codes: Option<Vec<SuccessCode>>,

    /// Retry rules.
    #[serde(skip)]
    pub retry_rules: Option<Vec<RetryRule>>,

    /// Per-tier timeout, in milliseconds on the wire.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "option_millis_serde"
    )]
    pub timeout: Option<Duration>,

    /// Number of retry tiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retry_tiers: Option<u32>,

    /// Base path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,

    /// Default headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSet>,
}

impl InstanceOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty options for a named instance.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().instance_name(name)
    }

    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the instance name.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Set the success specifiers.
    #[must_use]
    pub fn success_codes<I, C>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<SuccessCode>,
    {
        self.success_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the retry rules, replacing the defaults.
    #[must_use]
    pub fn retry_rules(mut self, rules: Vec<RetryRule>) -> Self {
        self.retry_rules = Some(rules);
        self
    }

    /// Set the per-tier timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the number of retry tiers.
    #[must_use]
    pub fn max_retry_tiers(mut self, tiers: u32) -> Self {
        self.max_retry_tiers = Some(tiers);
        self
    }

    /// Set the base path.
    #[must_use]
    pub fn base_path(mut self, base: impl Into<String>) -> Self {
        self.base_path = Some(base.into());
        self
    }

    /// Set the default headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Apply the present fields over the defaults.
    pub fn into_config(self) -> InstanceConfig {
        let defaults = InstanceConfig::default();
        InstanceConfig {
            success_codes: self.success_codes.unwrap_or(defaults.success_codes),
            retry_rules: self.retry_rules.unwrap_or(defaults.retry_rules),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            max_retry_tiers: self.max_retry_tiers.unwrap_or(defaults.max_retry_tiers),
            base_path: self.base_path.unwrap_or(defaults.base_path),
            headers: self.headers.unwrap_or(defaults.headers),
        }
    }
}

/// Cancellation handle shared by every request against an instance.
///
/// Each dispatch takes the current token. Aborting cancels that token and
/// installs a fresh one, so only transport calls already in flight are
/// affected.
#[derive(Debug, Default)]
pub struct AbortSwitch {
    current: Mutex<CancellationToken>,
}

impl AbortSwitch {
    /// Create a new switch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a dispatch starting now.
    pub fn token(&self) -> CancellationToken {
        self.current.lock().clone()
    }

    /// Abort every dispatch holding the current token.
    pub fn abort(&self) {
        let previous = std::mem::take(&mut *self.current.lock());
        previous.cancel();
    }
}

/// A named, shared instance configuration.
#[derive(Debug)]
pub struct Instance {
    name: String,
    config: RwLock<InstanceConfig>,
    abort: AbortSwitch,
}

impl Instance {
    /// Create an instance.
    pub fn new(name: impl Into<String>, config: InstanceConfig) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
            abort: AbortSwitch::new(),
        }
    }

    /// Create the default instance with default configuration.
    pub fn default_named(name: impl Into<String>) -> Self {
        Self::new(name, InstanceConfig::default())
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the reserved default instance.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_INSTANCE
    }

    /// A snapshot of the configuration.
    pub fn config(&self) -> InstanceConfig {
        self.config.read().clone()
    }

    /// Read the configuration without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&InstanceConfig) -> R) -> R {
        f(&self.config.read())
    }

    /// Mutate the configuration in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut InstanceConfig) -> R) -> R {
        f(&mut self.config.write())
    }

    /// The per-tier timeout.
    pub fn timeout(&self) -> Duration {
        self.read(|c| c.timeout)
    }

    /// The number of retry tiers.
    pub fn max_retry_tiers(&self) -> u32 {
        self.read(|c| c.max_retry_tiers)
    }

    /// The success specifiers.
    pub fn success_codes(&self) -> Vec<SuccessCode> {
        self.read(|c| c.success_codes.clone())
    }

    /// Token for a dispatch starting now.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.abort.token()
    }

    /// Abort every in-flight dispatch against this instance.
    pub fn abort_current(&self) {
        self.abort.abort();
    }
}

mod option_millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    // Negative values disable the ladder, same as zero.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<i64> = Option::deserialize(deserializer)?;
        Ok(opt.map(|ms| Duration::from_millis(ms.max(0) as u64)))
    }
}

mod lenient_codes {
    use fletch_core::SuccessCode;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<SuccessCode>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
        Ok(values.map(|values| SuccessCode::from_values(&values)))
    }
}
