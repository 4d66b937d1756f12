use std::time::{Duration, Instant};

/// Start time of a transfer, used to turn byte counts into estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferClock {
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferEstimate {
    pub elapsed: Duration,
    /// Completed share in `0.0..=1.0`, when the total is known.
    pub fraction: Option<f64>,
    pub bytes_per_second: Option<f64>,
    pub remaining: Option<Duration>,
}

impl TransferClock {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self { started }
    }

    pub fn estimate(&self, received: u64, total: Option<u64>) -> TransferEstimate {
        self.estimate_at(Instant::now(), received, total)
    }

    pub fn estimate_at(&self, now: Instant, received: u64, total: Option<u64>) -> TransferEstimate {
        let elapsed = now.saturating_duration_since(self.started);
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = (secs > 0.0 && received > 0).then(|| received as f64 / secs);

        let fraction = total
            .filter(|t| *t > 0)
            .map(|t| (received as f64 / t as f64).min(1.0));

        let remaining = match (total, bytes_per_second) {
            (Some(total), _) if received >= total => Some(Duration::ZERO),
            (Some(total), Some(rate)) => {
                Some(Duration::from_secs_f64((total - received) as f64 / rate))
            }
            _ => None,
        };

        TransferEstimate {
            elapsed,
            fraction,
            bytes_per_second,
            remaining,
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// `42s`, `3m05s` or `1h02m`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
