use std::path::Path;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use serde::Deserialize;

use http_sink::HttpSinkConfig;
use kafka_consumer::{KafkaConfig, KafkaTuning, NetConfig};
use pipeline::PipelineConfig;

use crate::error::AdapterError;

pub const DEFAULT_CONFIG: &str = "bridge.toml";

// ═══════════════════════════════════════════════════════════════
//  CLI args (flags and environment)
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "kafka-bridge", about = "Kafka topic → HTTP CloudEvents sink")]
pub struct Cli {
    /// Путь к TOML конфиг файлу (необязателен)
    #[arg(long, default_value = DEFAULT_CONFIG, env = "BRIDGE_CONFIG")]
    pub config: String,

    /// Kafka brokers, через запятую
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: Option<String>,

    /// Topic для чтения
    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    /// Consumer group
    #[arg(long, env = "KAFKA_CONSUMER_GROUP")]
    pub consumer_group: Option<String>,

    #[arg(long, env = "KAFKA_CONSUMER_GROUP_ID", hide = true)]
    pub consumer_group_id: Option<String>,

    /// URL sink'а (http/https), куда POST'ятся события
    #[arg(long, env = "SINK_URI")]
    pub sink_uri: Option<String>,

    #[arg(long, env = "KAFKA_NET_SASL_ENABLE", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub sasl_enable: Option<bool>,

    #[arg(long, env = "KAFKA_NET_SASL_USER")]
    pub sasl_user: Option<String>,

    #[arg(long, env = "KAFKA_NET_SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: Option<String>,

    #[arg(long, env = "KAFKA_NET_TLS_ENABLE", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub tls_enable: Option<bool>,

    /// Формат логов
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Логи JSON-строками (то же, что --log-format json)
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    pub fn json_logs(&self) -> bool {
        self.log_json || self.log_format == LogFormat::Json
    }
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub brokers: Option<String>,
    pub topic: Option<String>,
    pub consumer_group: Option<String>,
    pub sink_uri: Option<String>,
    #[serde(default)]
    pub net: NetConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sink: HttpSinkConfig,
    #[serde(default)]
    pub kafka: KafkaTuning,
}

impl FileConfig {
    /// Файл по умолчанию может отсутствовать, явно указанный обязан существовать.
    pub fn load(path: &str) -> Result<Self, AdapterError> {
        if !Path::new(path).exists() {
            if path == DEFAULT_CONFIG {
                return Ok(Self::default());
            }
            return Err(AdapterError::config("read", format!("'{path}': file not found")));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::config("read", format!("'{path}': {e}")))?;
        toml::from_str(&content).map_err(|e| AdapterError::config("parse", format!("'{path}': {e}")))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config file < env < CLI.
#[derive(Debug)]
pub struct Effective {
    pub kafka: KafkaConfig,
    pub sink: HttpSinkConfig,
    pub pipeline: PipelineConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, AdapterError> {
    non_empty(value).ok_or_else(|| AdapterError::config("required", format!("{name} is not set")))
}

impl Effective {
    pub fn new(cli: &Cli) -> Result<Self, AdapterError> {
        let file = FileConfig::load(&cli.config)?;
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: FileConfig) -> Result<Self, AdapterError> {
        let brokers = required(cli.brokers.clone().or(file.brokers), "KAFKA_BROKERS")?;
        let topic = required(cli.topic.clone().or(file.topic), "KAFKA_TOPIC")?;
        let group = required(
            non_empty(cli.consumer_group.clone())
                .or_else(|| cli.consumer_group_id.clone())
                .or(file.consumer_group),
            "KAFKA_CONSUMER_GROUP",
        )?;
        let sink_uri = required(cli.sink_uri.clone().or(file.sink_uri), "SINK_URI")?;

        let brokers: Vec<String> = brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect();

        let mut net = file.net;
        if let Some(enable) = cli.sasl_enable {
            net.sasl.enable = enable;
        }
        if let Some(user) = &cli.sasl_user {
            net.sasl.user = user.clone();
        }
        if let Some(password) = &cli.sasl_password {
            net.sasl.password = password.clone();
        }
        if let Some(enable) = cli.tls_enable {
            net.tls.enable = enable;
        }

        let pipeline = file.pipeline;
        pipeline.validate().map_err(|e| AdapterError::config("pipeline", e))?;

        let mut kafka = KafkaConfig::new(brokers, topic, group);
        kafka.net = net;
        kafka.tuning = file.kafka;
        kafka.partition_buffer = pipeline.partition_buffer;
        kafka.validate().map_err(|e| AdapterError::config("kafka", e.to_string()))?;

        let sink = HttpSinkConfig { uri: sink_uri, ..file.sink };
        sink.validate().map_err(|e| AdapterError::config("sink", e.to_string()))?;

        // Shutdown must outlast one sink request, or in-flight deliveries get aborted.
        if pipeline.shutdown_grace_ms < sink.timeout_ms {
            return Err(AdapterError::config(
                "pipeline",
                format!(
                    "shutdown_grace_ms ({}) is less than sink timeout_ms ({})",
                    pipeline.shutdown_grace_ms, sink.timeout_ms
                ),
            ));
        }

        Ok(Self { kafka, sink, pipeline })
    }
}
