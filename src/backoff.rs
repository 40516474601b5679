use std::time::Duration;

use serde::Deserialize;

/// Exponential backoff parameters.
///
/// A multiplier of 1 gives a fixed interval, which is what the stability
/// sampling uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub ceiling: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, ceiling: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            multiplier,
            ceiling,
            max_attempts,
        }
    }

    /// Same delay between every attempt.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self::new(interval, 1.0, interval, max_attempts)
    }

    /// The delays to wait between consecutive attempts.
    ///
    /// There is one delay less than there are attempts: nothing is waited
    /// after the last one.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let multiplier = self.multiplier.max(1.0);
        let ceiling = self.ceiling;

        let mut next = self.initial.min(ceiling);
        (1..self.max_attempts).map(move |_| {
            let current = next;
            next = Duration::try_from_secs_f64(next.as_secs_f64() * multiplier)
                .map_or(ceiling, |grown| grown.min(ceiling));
            current
        })
    }

    /// Call `f` until it returns `Some`, sleeping between attempts.
    ///
    /// `f` receives the zero-based attempt number. Return `None` once
    /// every attempt has been used.
    pub fn retry<T, F>(&self, f: F) -> Option<T>
    where
        F: FnMut(u32) -> Option<T>,
    {
        self.retry_with_sleep(f, std::thread::sleep)
    }

    pub(crate) fn retry_with_sleep<T, F, S>(&self, mut f: F, mut sleep: S) -> Option<T>
    where
        F: FnMut(u32) -> Option<T>,
        S: FnMut(Duration),
    {
        let mut delays = self.delays();
        for attempt in 0..self.max_attempts {
            if let Some(found) = f(attempt) {
                return Some(found);
            }
            if let Some(delay) = delays.next() {
                sleep(delay);
            }
        }
        None
    }
}

/// Serializable form of [`Backoff`], in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 1.5,
            max_delay_ms: 3000,
            max_attempts: 10,
        }
    }
}

impl From<BackoffSettings> for Backoff {
    fn from(s: BackoffSettings) -> Self {
        Backoff::new(
            Duration::from_millis(s.initial_delay_ms),
            s.multiplier,
            Duration::from_millis(s.max_delay_ms),
            s.max_attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn delays_grow_until_the_ceiling() {
        let backoff = Backoff::new(ms(1000), 1.5, ms(3000), 6);
        let delays: Vec<_> = backoff.delays().collect();

        assert_eq!(delays, vec![ms(1000), ms(1500), ms(2250), ms(3000), ms(3000)]);
    }

    #[test]
    fn huge_growth_is_capped_by_the_ceiling() {
        let settings = BackoffSettings {
            initial_delay_ms: 1000,
            multiplier: 1e300,
            max_delay_ms: 3000,
            max_attempts: 3,
        };
        let delays: Vec<_> = Backoff::from(settings).delays().collect();
        assert_eq!(delays, vec![ms(1000), ms(3000)]);

        let backoff = Backoff::new(Duration::MAX, 2.0, Duration::MAX, 3);
        let delays: Vec<_> = backoff.delays().collect();
        assert_eq!(delays, vec![Duration::MAX, Duration::MAX]);
    }

    #[test]
    fn nan_multiplier_keeps_the_interval() {
        let delays: Vec<_> = Backoff::new(ms(10), f64::NAN, ms(100), 3).delays().collect();
        assert_eq!(delays, vec![ms(10), ms(10)]);
    }

    #[test]
    fn fixed_interval() {
        let delays: Vec<_> = Backoff::fixed(ms(100), 3).delays().collect();
        assert_eq!(delays, vec![ms(100), ms(100)]);
    }

    #[test]
    fn retry_stops_at_first_success() {
        let backoff = Backoff::new(ms(10), 2.0, ms(100), 5);
        let mut slept = vec![];

        let found = backoff.retry_with_sleep(
            |attempt| (attempt == 2).then_some(attempt),
            |d| slept.push(d),
        );

        assert_eq!(found, Some(2));
        assert_eq!(slept, vec![ms(10), ms(20)]);
    }

    #[test]
    fn retry_gives_up_without_trailing_sleep() {
        let backoff = Backoff::new(ms(10), 2.0, ms(15), 3);
        let mut calls = 0;
        let mut slept = vec![];

        let found: Option<()> = backoff.retry_with_sleep(
            |_| {
                calls += 1;
                None
            },
            |d| slept.push(d),
        );

        assert_eq!(found, None);
        assert_eq!(calls, 3);
        assert_eq!(slept, vec![ms(10), ms(15)]);
    }

    #[test]
    fn zero_attempts_never_calls() {
        let backoff = Backoff::fixed(ms(1), 0);
        let found: Option<()> = backoff.retry(|_| panic!("should not be called"));
        assert_eq!(found, None);
    }
}
