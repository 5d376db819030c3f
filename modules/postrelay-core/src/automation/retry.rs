use std::future::Future;
use std::time::Duration;

/// Bounded polling with a fixed interval between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

/// One scheduled attempt. `number` is 1-based; `delay` is the wait before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTick {
    pub number: u32,
    pub delay: Duration,
    pub is_last: bool,
}

/// What an attempt decided.
#[derive(Debug)]
pub enum Step<T> {
    Done(T),
    Retry,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Fresh attempt schedule. Each call starts over at attempt 1.
    pub fn attempts(&self) -> Attempts {
        Attempts {
            policy: *self,
            next: 1,
        }
    }
}

pub struct Attempts {
    policy: RetryPolicy,
    next: u32,
}

impl Iterator for Attempts {
    type Item = AttemptTick;

    fn next(&mut self) -> Option<AttemptTick> {
        if self.next > self.policy.max_attempts {
            return None;
        }
        let number = self.next;
        self.next += 1;
        Some(AttemptTick {
            number,
            delay: if number == 1 {
                Duration::ZERO
            } else {
                self.policy.interval
            },
            is_last: number == self.policy.max_attempts,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.policy.max_attempts + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

/// Drive `attempt` over the policy's schedule until it returns `Done` or the
/// schedule is exhausted (`None`).
pub async fn run_bounded<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Option<T>
where
    F: FnMut(AttemptTick) -> Fut,
    Fut: Future<Output = Step<T>>,
{
    for tick in policy.attempts() {
        if !tick.delay.is_zero() {
            tokio::time::sleep(tick.delay).await;
        }
        if let Step::Done(value) = attempt(tick).await {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn schedule_is_bounded_and_restartable() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let ticks: Vec<_> = policy.attempts().collect();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].delay, Duration::ZERO);
        assert_eq!(ticks[1].delay, Duration::from_millis(10));
        assert!(ticks[2].is_last);
        assert!(!ticks[1].is_last);

        // A second schedule starts over.
        assert_eq!(policy.attempts().next().map(|t| t.number), Some(1));
    }

    #[test]
    fn zero_attempts_yields_nothing() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.attempts().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_bounded_stops_on_done() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(10, Duration::from_secs(1));

        let result = run_bounded(&policy, |tick| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if tick.number == 4 {
                    Step::Done(tick.number)
                } else {
                    Step::Retry
                }
            }
        })
        .await;

        assert_eq!(result, Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_bounded_exhausts_with_none() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let result: Option<()> = run_bounded(&policy, |_| async { Step::Retry }).await;

        assert!(result.is_none());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }
}
