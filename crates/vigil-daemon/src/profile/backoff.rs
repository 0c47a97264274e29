use std::time::Duration;

/// Exponential retry pacing for buffered persistence writes.
pub struct RetryBackoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    current_delay: Duration,
    attempt: u32,
    jitter: bool,
}

impl RetryBackoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base_delay: base,
            max_delay: max.max(base),
            multiplier: 2.0,
            current_delay: base,
            attempt: 0,
            jitter: true,
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let delay = if self.attempt == 1 {
            self.base_delay
        } else {
            let multiplied = self.current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(multiplied.min(self.max_delay.as_secs_f64()))
        };
        self.current_delay = delay;

        if self.jitter {
            let jitter_factor = 0.5 + rand::random::<f64>() * 0.5;
            Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
        } else {
            delay
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.base_delay;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
