use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Commit Policy
// ═══════════════════════════════════════════════════════════════

/// Когда partition worker сдвигает commit cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit после каждой попытки доставки, успешной или нет.
    /// At-most-once: упавшая доставка логируется и больше не повторяется.
    #[default]
    Always,
    /// Commit только после успешной доставки; ошибки повторяются с
    /// exponential backoff до успеха или отмены. At-least-once.
    #[serde(alias = "on-success")]
    OnSuccess,
}

impl std::fmt::Display for CommitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitPolicy::Always => f.write_str("always"),
            CommitPolicy::OnSuccess => f.write_str("on_success"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

/// Настройки pipeline: commit policy, retry, буферы, shutdown.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub commit_policy: CommitPolicy,
    /// Размер буфера записей между consumer'ом и worker'ом партиции.
    #[serde(default = "default_partition_buffer")]
    pub partition_buffer: usize,
    /// Первая пауза перед повтором доставки (только `on_success`).
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    /// Верхняя граница паузы между повторами.
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
    /// Сколько ждать worker'ов при shutdown, прежде чем abort.
    /// Должно покрывать timeout одного запроса к sink'у, иначе доставка
    /// в полёте обрывается и offset не коммитится.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_policy: CommitPolicy::default(),
            partition_buffer: default_partition_buffer(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.partition_buffer == 0 {
            return Err("pipeline: partition_buffer must be greater than 0".into());
        }
        if self.retry_initial_backoff_ms == 0 {
            return Err("pipeline: retry_initial_backoff_ms must be greater than 0".into());
        }
        if self.retry_max_backoff_ms < self.retry_initial_backoff_ms {
            return Err(format!(
                "pipeline: retry_max_backoff_ms ({}) is less than retry_initial_backoff_ms ({})",
                self.retry_max_backoff_ms, self.retry_initial_backoff_ms
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_partition_buffer() -> usize {
    1024
}
fn default_retry_initial_backoff_ms() -> u64 {
    100
}
fn default_retry_max_backoff_ms() -> u64 {
    10_000
}
fn default_shutdown_grace_ms() -> u64 {
    15_000
}

// ═══════════════════════════════════════════════════════════════
//  Backoff
// ═══════════════════════════════════════════════════════════════

/// Exponential backoff: initial, ×2 на каждый шаг, не больше max.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max: max.max(initial) }
    }

    /// Пауза перед повтором номер `attempt` (с 0).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}
