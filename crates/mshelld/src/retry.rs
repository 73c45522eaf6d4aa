//! Reconnect policies

use std::time::Duration;

use mshell_core::config::DaemonSettings;

/// Decides how long to wait before the next session
pub trait RetryPolicy: Send {
    /// Delay before reconnecting, or `None` to give up
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Same delay every time, optionally for a limited number of reconnects
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl FixedDelay {
    /// Retry forever with `delay` between sessions
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            attempts: 0,
        }
    }

    /// Stop after `max_attempts` reconnects
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Build from daemon settings; `max_reconnects = 0` means forever
    pub fn from_settings(settings: &DaemonSettings) -> Self {
        let policy = Self::new(settings.reconnect_delay);
        match settings.max_reconnects {
            0 => policy,
            max => policy.with_max_attempts(max),
        }
    }

    /// Reconnects granted so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        self.attempts = self.attempts.saturating_add(1);
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_fixed() {
        let mut policy = FixedDelay::new(Duration::from_secs(10));

        for _ in 0..100 {
            assert_eq!(policy.next_delay(), Some(Duration::from_secs(10)));
        }
        assert_eq!(policy.attempts(), 100);
    }

    #[test]
    fn test_max_attempts() {
        let mut policy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(2);

        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_from_settings() {
        let settings: DaemonSettings = toml::from_str(
            r#"
address = "relay:6000"
reconnect_delay = 3
max_reconnects = 1
"#,
        )
        .unwrap();

        let mut policy = FixedDelay::from_settings(&settings);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
        assert_eq!(policy.next_delay(), None);
    }
}
