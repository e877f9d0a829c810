use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::application::detection_state::DetectionState;
use crate::application::ports::NotifierPort;
use crate::domain::{detection::Detection, stream::summarize_detections};

/// Capacidad de la cola hacia el notificador. Si se llena, la alerta se descarta.
const ALERT_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct Alert {
    pub source: String,
    pub summary: String,
    pub raised_at: DateTime<Local>,
}

/// Disparador de alertas con enfriamiento global.
///
/// La comprobación del enfriamiento usa el mismo lock que [`DetectionState`];
/// el envío real ocurre en una tarea aparte, así que quien detecta nunca espera.
#[derive(Clone)]
pub struct AlertDispatcher {
    state: Arc<DetectionState>,
    cooldown: Duration,
    tx: mpsc::Sender<Alert>,
}

impl AlertDispatcher {
    pub fn new(state: Arc<DetectionState>, cooldown: Duration, tx: mpsc::Sender<Alert>) -> Self {
        Self { state, cooldown, tx }
    }

    /// Crea el canal y lanza el worker notificador en el runtime indicado.
    pub fn spawn(
        state: Arc<DetectionState>,
        cooldown: Duration,
        notifier: Arc<dyn NotifierPort>,
        handle: &tokio::runtime::Handle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(ALERT_QUEUE);
        handle.spawn(run_notifier(rx, notifier));
        Self::new(state, cooldown, tx)
    }

    /// Devuelve `true` si se encoló una alerta.
    pub fn maybe_alert(&self, weapon_found: bool, source: &str, detections: &[Detection]) -> bool {
        self.maybe_alert_at(weapon_found, Instant::now(), source, detections)
    }

    pub fn maybe_alert_at(
        &self,
        weapon_found: bool,
        now: Instant,
        source: &str,
        detections: &[Detection],
    ) -> bool {
        if !weapon_found {
            return false;
        }

        // Primero el hueco en la cola: si no cabe, el enfriamiento no se consume.
        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                warn!("Cola de alertas llena; alerta descartada");
                return false;
            }
            Err(TrySendError::Closed(())) => {
                warn!("Notificador detenido; alerta descartada");
                return false;
            }
        };

        if !self.state.try_claim_alert(now, self.cooldown) {
            debug!("Alerta suprimida por enfriamiento ({}s)", self.cooldown.as_secs());
            return false;
        }

        permit.send(Alert {
            source: source.to_string(),
            summary: summarize_detections(detections),
            raised_at: Local::now(),
        });
        info!("🚨 Alerta encolada para {}", source);
        true
    }
}

/// Worker que entrega las alertas. Los fallos sólo se registran.
pub async fn run_notifier(mut rx: mpsc::Receiver<Alert>, notifier: Arc<dyn NotifierPort>) {
    while let Some(alert) = rx.recv().await {
        if !notifier.is_configured() {
            info!("[ALERT] Configuración de email incompleta; no se envía.");
            continue;
        }
        match notifier.notify(&alert).await {
            Ok(()) => info!("✅ [ALERT] Notificación enviada ({})", alert.summary),
            Err(e) => error!("❌ [ALERT] Error enviando notificación: {}", e),
        }
    }
    debug!("Notificador: canal cerrado, saliendo");
}
