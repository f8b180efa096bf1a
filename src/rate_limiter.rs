use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Limita la frecuencia de procesamiento de notificaciones.
/// Lo que llega antes del intervalo se descarta, no se encola.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval_ms: u64,
    last_accepted: Option<u64>,
}

impl RateLimiter {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_accepted: None,
        }
    }

    /// Admite `now_ms` si han pasado al menos `interval_ms` desde la última admitida
    pub fn admit(&mut self, now_ms: u64) -> bool {
        let accept = match self.last_accepted {
            None => true,
            // Un reloj que retrocede no cuenta como intervalo cumplido
            Some(last) => now_ms >= last && now_ms - last >= self.interval_ms,
        };
        if accept {
            self.last_accepted = Some(now_ms);
        }
        accept
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

/// Alcance del limitador: un único timestamp compartido o uno por canal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    #[default]
    Global,
    PerChannel,
}

/// Limitador con el alcance configurado
#[derive(Debug, Clone)]
pub struct ScopedRateLimiter {
    scope: RateLimitScope,
    interval_ms: u64,
    global: RateLimiter,
    per_channel: HashMap<String, RateLimiter>,
}

impl ScopedRateLimiter {
    pub fn new(scope: RateLimitScope, interval_ms: u64) -> Self {
        Self {
            scope,
            interval_ms,
            global: RateLimiter::new(interval_ms),
            per_channel: HashMap::new(),
        }
    }

    pub fn admit(&mut self, channel: &str, now_ms: u64) -> bool {
        match self.scope {
            RateLimitScope::Global => self.global.admit(now_ms),
            RateLimitScope::PerChannel => {
                let interval_ms = self.interval_ms;
                self.per_channel
                    .entry(channel.to_string())
                    .or_insert_with(|| RateLimiter::new(interval_ms))
                    .admit(now_ms)
            }
        }
    }

    pub fn reset(&mut self) {
        self.global.reset();
        self.per_channel.clear();
    }
}
