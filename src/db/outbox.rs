use async_trait::async_trait;
use sqlx::PgPool;

use crate::booking::reminders::{Notifier, ReminderPayload};

/// Queues reminders in `notification_outbox`. A mail relay drains the table
/// and sets `delivered_at`.
#[derive(Clone)]
pub struct OutboxNotifier {
    db: PgPool,
    clinic_name: String,
}

impl OutboxNotifier {
    pub fn new(db: PgPool, clinic_name: impl Into<String>) -> Self {
        Self {
            db,
            clinic_name: clinic_name.into(),
        }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send_reminder(&self, reminder: &ReminderPayload) -> anyhow::Result<()> {
        if reminder.recipient_email.trim().is_empty() {
            anyhow::bail!("patient has no email address");
        }

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (appointment_id, recipient, subject, body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reminder.appointment_id)
        .bind(&reminder.recipient_email)
        .bind(format!("{} - {}", self.clinic_name, reminder.subject()))
        .bind(reminder.body())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
