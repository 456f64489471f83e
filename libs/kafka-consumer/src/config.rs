use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use serde::Deserialize;

use crate::error::KafkaError;

// ═══════════════════════════════════════════════════════════════
//  Transport security
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetConfig {
    pub sasl: SaslConfig,
    pub tls: TlsConfig,
}

#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SaslConfig {
    pub enable: bool,
    pub user: String,
    pub password: String,
    /// `sasl.mechanisms` value: PLAIN, SCRAM-SHA-256, SCRAM-SHA-512.
    pub mechanism: String,
}

impl Default for SaslConfig {
    fn default() -> Self {
        Self {
            enable: false,
            user: String::new(),
            password: String::new(),
            mechanism: default_mechanism(),
        }
    }
}

fn default_mechanism() -> String {
    "PLAIN".into()
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("SaslConfig")
            .field("enable", &self.enable)
            .field("user", &self.user)
            .field("password", &password)
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    pub enable: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Consumer tuning ([kafka] section)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KafkaTuning {
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_auto_commit_interval_ms")]
    pub auto_commit_interval_ms: u64,
    /// Timeout of the startup metadata probe.
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
    /// Raw librdkafka properties, applied last. Keys from
    /// [`RESERVED_PROPERTIES`] are refused by [`KafkaConfig::validate`].
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

fn default_auto_commit_interval_ms() -> u64 {
    1_000
}

fn default_metadata_timeout_ms() -> u64 {
    10_000
}

impl Default for KafkaTuning {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            auto_commit_interval_ms: default_auto_commit_interval_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaTuning {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaConfig
// ═══════════════════════════════════════════════════════════════

/// Properties owned by the consumer itself: the group, the initial
/// position and the offset store/commit discipline.
pub const RESERVED_PROPERTIES: &[&str] = &[
    "bootstrap.servers",
    "group.id",
    "auto.offset.reset",
    "enable.auto.commit",
    "enable.auto.offset.store",
];

/// Everything needed to join the consumer group of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub consumer_group: String,
    pub net: NetConfig,
    pub tuning: KafkaTuning,
    /// Records buffered per partition between the poll loop and its worker.
    pub partition_buffer: usize,
}

impl KafkaConfig {
    pub fn new(
        brokers: Vec<String>,
        topic: impl Into<String>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            consumer_group: consumer_group.into(),
            net: NetConfig::default(),
            tuning: KafkaTuning::default(),
            partition_buffer: 1024,
        }
    }

    pub fn validate(&self) -> Result<(), KafkaError> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(KafkaError::Config("brokers is empty".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(KafkaError::Config("topic is empty".into()));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(KafkaError::Config("consumer group is empty".into()));
        }
        let sasl = &self.net.sasl;
        if sasl.enable && (sasl.user.is_empty() || sasl.password.is_empty()) {
            return Err(KafkaError::Config("SASL enabled without user/password".into()));
        }
        if self.partition_buffer == 0 {
            return Err(KafkaError::Config("partition_buffer must be > 0".into()));
        }
        if let Some(key) = self
            .tuning
            .properties
            .keys()
            .find(|key| RESERVED_PROPERTIES.contains(&key.trim()))
        {
            return Err(KafkaError::Config(format!("property '{key}' cannot be overridden")));
        }
        Ok(())
    }

    /// `security.protocol` for the (tls, sasl) combination.
    pub fn security_protocol(&self) -> &'static str {
        match (self.net.tls.enable, self.net.sasl.enable) {
            (false, false) => "plaintext",
            (true, false) => "ssl",
            (false, true) => "sasl_plaintext",
            (true, true) => "sasl_ssl",
        }
    }

    /// librdkafka properties of the group consumer.
    ///
    /// Offsets are stored explicitly by the worker (`store_offset`) and
    /// flushed by the client's periodic auto-commit.
    pub fn client_config(&self) -> ClientConfig {
        let brokers: Vec<&str> = self
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();

        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", brokers.join(","))
            .set("group.id", &self.consumer_group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", self.tuning.session_timeout_ms.to_string())
            .set("auto.commit.interval.ms", self.tuning.auto_commit_interval_ms.to_string())
            .set("security.protocol", self.security_protocol());

        if self.net.sasl.enable {
            cfg.set("sasl.mechanisms", &self.net.sasl.mechanism)
                .set("sasl.username", &self.net.sasl.user)
                .set("sasl.password", &self.net.sasl.password);
        }

        for (key, value) in &self.tuning.properties {
            cfg.set(key, value);
        }
        cfg
    }
}
