use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::BookingError;
use super::store::BookingStore;

/// Everything a mail channel needs to remind one patient.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReminderPayload {
    pub appointment_id: Uuid,
    pub recipient_email: String,
    pub patient_name: String,
    pub doctor_name: String,
    #[sqlx(rename = "appt_date")]
    pub date: NaiveDate,
    #[sqlx(rename = "appt_time")]
    pub time: NaiveTime,
}

impl ReminderPayload {
    pub fn subject(&self) -> String {
        format!("Reminder: your appointment with {}", self.doctor_name)
    }

    pub fn body(&self) -> String {
        format!(
            "Dear {}, you have an appointment on {} at {}.",
            self.patient_name,
            self.date.format("%d.%m.%Y"),
            self.time.format("%H:%M")
        )
    }
}

/// Outbound channel for reminders. Delivery and retries are the channel's
/// business; an `Err` only means this hand-off failed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminder(&self, reminder: &ReminderPayload) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

/// One pass over tomorrow's scheduled appointments. A reminder is stamped as
/// sent only after the notifier accepted it, so failures are picked up again
/// by the next pass. Notification failures never reach the caller.
pub async fn sweep<S, N>(
    store: &S,
    notifier: &N,
    today: NaiveDate,
) -> Result<SweepReport, BookingError>
where
    S: BookingStore + ?Sized,
    N: Notifier + ?Sized,
{
    let tomorrow = today + Duration::days(1);
    let due = store.reminders_due(tomorrow).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..Default::default()
    };

    for reminder in &due {
        match notifier.send_reminder(reminder).await {
            Ok(()) => {
                // a failed stamp means a possible duplicate next hour, which is acceptable
                if let Err(e) = store.mark_reminded(reminder.appointment_id).await {
                    warn!(
                        appointment_id = %reminder.appointment_id,
                        error = %e,
                        "could not stamp reminder"
                    );
                }
                report.sent += 1;
            }
            Err(e) => {
                warn!(
                    appointment_id = %reminder.appointment_id,
                    error = %e,
                    "reminder delivery failed"
                );
                report.failed += 1;
            }
        }
    }

    if report.due > 0 {
        info!(
            date = %tomorrow,
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            "reminder sweep finished"
        );
    } else {
        debug!(date = %tomorrow, "no reminders due");
    }
    Ok(report)
}
