use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::application::{alert_service::Alert, ports::NotifierPort};
use crate::config::MailConfig;
use crate::domain::errors::{DomainError, DomainResult};

pub const ALERT_SUBJECT: &str = "Weapon Detected!";

/// Notificador por email (SMTP con TLS implícito, p. ej. Gmail en el 465).
pub struct SmtpNotifier {
    cfg: MailConfig,
}

impl SmtpNotifier {
    pub fn new(cfg: MailConfig) -> Self {
        Self { cfg }
    }

    pub fn build_message(&self, alert: &Alert) -> DomainResult<Message> {
        let (Some(sender), Some(receiver)) = (&self.cfg.sender, &self.cfg.receiver) else {
            return Err(DomainError::InvalidInput("remitente o destinatario sin configurar".into()));
        };
        let from: Mailbox = sender
            .parse()
            .map_err(|e| DomainError::InvalidInput(format!("remitente inválido: {e}")))?;
        let to: Mailbox = receiver
            .parse()
            .map_err(|e| DomainError::InvalidInput(format!("destinatario inválido: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(ALERT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(alert_body(alert))
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo construir el email: {e}")))
    }
}

pub fn alert_body(alert: &Alert) -> String {
    let mut body = String::from("⚠ A weapon was detected by the surveillance system.\n\n");
    body.push_str(&format!("Source: {}\n", alert.source));
    if !alert.summary.is_empty() {
        body.push_str(&format!("Detections: {}\n", alert.summary));
    }
    body.push_str(&format!("Time: {}\n", alert.raised_at.format("%Y-%m-%d %H:%M:%S %Z")));
    body
}

#[async_trait]
impl NotifierPort for SmtpNotifier {
    fn is_configured(&self) -> bool {
        self.cfg.is_complete()
    }

    async fn notify(&self, alert: &Alert) -> DomainResult<()> {
        let (Some(user), Some(password)) = (&self.cfg.sender, &self.cfg.password) else {
            return Err(DomainError::InvalidInput("credenciales SMTP sin configurar".into()));
        };
        let email = self.build_message(alert)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.cfg.smtp_host)
            .map_err(|e| DomainError::OperationFailed(format!("SMTP {}: {e}", self.cfg.smtp_host)))?
            .port(self.cfg.smtp_port)
            .credentials(Credentials::new(user.clone(), password.clone()))
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("envío SMTP fallido: {e}")))?;
        debug!("Email de alerta entregado a {}:{}", self.cfg.smtp_host, self.cfg.smtp_port);
        Ok(())
    }
}
