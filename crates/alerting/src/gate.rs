//! Alert deduplication

use dms::Alert;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two announcements (seconds)
    pub cooldown_seconds: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 3.0,
        }
    }
}

/// Decides which alert frames get announced.
///
/// A verdict stream repeats `DrowsyOrDistracted` on every frame of an
/// episode. The gate announces the first one, then at most once per cooldown
/// while the episode lasts. A new episode starting inside the cooldown of the
/// previous announcement stays silent.
#[derive(Debug, Clone)]
pub struct AlertGate {
    cooldown: Duration,
    last_fired: Option<Instant>,
    active: bool,
    fire_count: usize,
    episodes: usize,
}

impl AlertGate {
    pub fn new(config: &AlertConfig) -> Self {
        let cooldown = if config.cooldown_seconds.is_finite() && config.cooldown_seconds > 0.0 {
            Duration::from_secs_f64(config.cooldown_seconds)
        } else {
            Duration::ZERO
        };
        Self {
            cooldown,
            last_fired: None,
            active: false,
            fire_count: 0,
            episodes: 0,
        }
    }

    /// Feed one frame's alert; true when it should be announced
    pub fn should_announce(&mut self, alert: Alert, now: Instant) -> bool {
        if !alert.is_alert() {
            if self.active {
                info!("Alert episode cleared");
            }
            self.active = false;
            return false;
        }

        if !self.active {
            self.active = true;
            self.episodes += 1;
        }

        let due = self
            .last_fired
            .map_or(true, |t| now.saturating_duration_since(t) >= self.cooldown);
        if !due {
            debug!("Alert suppressed: in cooldown period");
            return false;
        }

        self.last_fired = Some(now);
        self.fire_count += 1;
        true
    }

    /// Announcements made so far
    pub fn fire_count(&self) -> usize {
        self.fire_count
    }

    /// Alert episodes seen so far
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(&AlertConfig::default())
    }
}
