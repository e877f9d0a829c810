use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Estado compartido "arma visible ahora" más el instante de la última alerta.
/// Ambos viven bajo el mismo mutex.
#[derive(Debug, Default)]
pub struct DetectionState {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    detected: bool,
    last_alert: Option<Instant>,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Un pánico con el lock tomado no deja el estado a medias: son dos campos Copy.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_detected(&self, detected: bool) {
        self.lock().detected = detected;
    }

    pub fn is_detected(&self) -> bool {
        self.lock().detected
    }

    /// Reserva el turno de alerta si ha pasado más de `cooldown` desde la anterior.
    /// Comprobación y actualización son atómicas.
    pub fn try_claim_alert(&self, now: Instant, cooldown: Duration) -> bool {
        let mut inner = self.lock();
        let ready = match inner.last_alert {
            None => true,
            Some(prev) => now.saturating_duration_since(prev) > cooldown,
        };
        if ready {
            inner.last_alert = Some(now);
        }
        ready
    }
}
