//! Batch progress events and remaining-time estimation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Emitted once per job, before any of its work starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 1-based position of the job in the plan.
    pub current: usize,
    pub total: usize,
    /// File name of the job's input.
    pub filename: String,
}

/// Estimated time left once job `current` of `total` has started.
///
/// `elapsed` covers the jobs finished so far, `current - 1` of them. There is
/// nothing to average before the first job finishes, so the estimate starts at
/// job 2.
pub fn estimate_remaining(elapsed: Duration, current: usize, total: usize) -> Option<Duration> {
    if current <= 1 || current > total {
        return None;
    }
    let finished = (current - 1) as u32;
    let remaining = (total - current + 1) as u32;
    Some(elapsed / finished * remaining)
}

/// Human-friendly duration: `45s`, `3m 07s`, `1h 02m`.
pub fn format_eta(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_estimate_for_first_job() {
        assert_eq!(estimate_remaining(Duration::from_secs(5), 1, 10), None);
        assert_eq!(estimate_remaining(Duration::ZERO, 0, 0), None);
    }

    #[test]
    fn test_estimate_uses_average_job_time() {
        // Two jobs done in 20s, job 3 of 5 starting: 3 jobs left at 10s each
        assert_eq!(
            estimate_remaining(Duration::from_secs(20), 3, 5),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(8), 5, 5),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(45)), "45s");
        assert_eq!(format_eta(Duration::from_secs(187)), "3m 07s");
        assert_eq!(format_eta(Duration::from_secs(3720)), "1h 02m");
    }

    #[test]
    fn test_event_serializes() {
        let event = ProgressEvent {
            current: 2,
            total: 3,
            filename: "clip.mp4".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"current":2,"total":3,"filename":"clip.mp4"}"#);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_estimate_shrinks_as_batch_advances(
            per_job_ms in 1u64..10_000,
            total in 2usize..50,
        ) {
            let mut previous: Option<Duration> = None;
            for current in 2..=total {
                let elapsed = Duration::from_millis(per_job_ms * (current as u64 - 1));
                let estimate = estimate_remaining(elapsed, current, total).unwrap();
                if let Some(prev) = previous {
                    prop_assert!(estimate <= prev);
                }
                previous = Some(estimate);
            }
        }
    }
}
