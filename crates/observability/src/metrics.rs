//! 广播指标收集模块
//!
//! 基于 Outcome / RunSummary 记录 Prometheus 指标，并在内存中聚合延迟统计。

use std::collections::HashMap;
use std::time::Duration;

use contracts::{Outcome, OutcomeCounts, OutcomeKind, ProgressSnapshot, RunSummary};
use metrics::{counter, gauge, histogram};

/// 记录单个接收者的发送结果
///
/// 每产生一个 Outcome 调用一次。
///
/// # Example
///
/// ```ignore
/// while let Some(update) = handle.next_update().await {
///     observability::metrics::record_outcome(update.outcome.kind, update.outcome.latency);
/// }
/// ```
pub fn record_outcome(kind: OutcomeKind, latency: Duration) {
    counter!("broadcast_outcomes_total", "kind" => kind.as_str()).increment(1);

    // dry-run 没有真实网络延迟
    if kind != OutcomeKind::Skipped {
        histogram!("broadcast_send_latency_ms", "kind" => kind.as_str())
            .record(latency.as_secs_f64() * 1000.0);
    }
}

/// 记录批次开始
pub fn record_batch(batch: usize) {
    counter!("broadcast_batches_total").increment(1);
    gauge!("broadcast_current_batch").set(batch as f64);
}

/// 记录实时进度
pub fn record_progress(snapshot: &ProgressSnapshot) {
    gauge!("broadcast_pending").set(snapshot.pending as f64);
    gauge!("broadcast_completed").set(snapshot.completed() as f64);
    gauge!("broadcast_send_rate").set(snapshot.rate());
}

/// 记录运行结束
pub fn record_run_summary(summary: &RunSummary) {
    counter!(
        "broadcast_runs_total",
        "termination" => summary.termination.as_str(),
        "dry_run" => if summary.dry_run { "true" } else { "false" }
    )
    .increment(1);

    gauge!("broadcast_run_success_rate").set(summary.success_rate);
    histogram!("broadcast_run_duration_ms").record(summary.duration().as_secs_f64() * 1000.0);

    if !summary.unprocessed.is_empty() {
        counter!("broadcast_unprocessed_total").increment(summary.unprocessed.len() as u64);
    }
}

/// 发送结果聚合器
///
/// 在内存中聚合一次运行的结果，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsAggregator {
    /// 各类结果计数
    pub counts: OutcomeCounts,

    /// 全部真实发送的延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 按结果类型的延迟统计 (毫秒)
    pub kind_latency: HashMap<OutcomeKind, RunningStats>,

    /// 已开始的批次数
    pub batches: u64,

    last_batch: Option<usize>,
}

impl DeliveryStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    ///
    /// 返回 true 表示该结果属于一个新的批次。
    pub fn update(&mut self, outcome: &Outcome) -> bool {
        self.counts.record(outcome.kind);

        if outcome.kind != OutcomeKind::Skipped {
            let ms = outcome.latency.as_secs_f64() * 1000.0;
            self.latency_stats.push(ms);
            self.kind_latency.entry(outcome.kind).or_default().push(ms);
        }

        let new_batch = self.last_batch.is_none_or(|last| outcome.batch > last);
        if new_batch {
            self.batches += 1;
            self.last_batch = Some(outcome.batch);
        }
        new_batch
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliveryStatsSummary {
        let mut kind_latency_ms: Vec<(OutcomeKind, StatsSummary)> = self
            .kind_latency
            .iter()
            .map(|(kind, stats)| (*kind, StatsSummary::from(stats)))
            .collect();
        kind_latency_ms.sort_by_key(|(kind, _)| OutcomeKind::ALL.iter().position(|k| k == kind));

        DeliveryStatsSummary {
            counts: self.counts,
            batches: self.batches,
            success_rate: self.counts.success_rate(),
            latency_ms: StatsSummary::from(&self.latency_stats),
            kind_latency_ms,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 发送统计摘要
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsSummary {
    pub counts: OutcomeCounts,
    pub batches: u64,
    pub success_rate: f64,
    pub latency_ms: StatsSummary,
    pub kind_latency_ms: Vec<(OutcomeKind, StatsSummary)>,
}

impl std::fmt::Display for DeliveryStatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Statistics ===")?;
        writeln!(f, "Batches: {}", self.batches)?;
        for (kind, count) in self.counts.iter().filter(|(_, n)| *n > 0) {
            writeln!(f, "{:<15} {}", format!("{kind}:"), count)?;
        }
        writeln!(f, "Success rate: {:.2}%", self.success_rate)?;
        writeln!(f, "Send latency (ms): {}", self.latency_ms)?;

        for (kind, stats) in &self.kind_latency_ms {
            writeln!(f, "  {kind}: {stats}")?;
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
