//! Sequential bulk dispatch over the SMS gateway.

use super::SmsGateway;
use simcha_core::error::SimchaError;
use simcha_core::invite::{BatchReport, Invitation, Progress, SendResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reason recorded for recipients skipped after cancellation.
pub const CANCELLED: &str = "cancelled";

/// Send every invitation in input order, one in-flight call at a time.
///
/// Sequencing is deliberate: the gateway is rate-limited and must never see
/// concurrent sends from one account. A single recipient's failure never
/// aborts the batch, and the progress callback fires synchronously after
/// every attempt. Cancellation is honored between iterations: remaining
/// recipients are recorded as failed without a network call, so the
/// successful+failed==total invariant still holds.
pub async fn send_bulk(
    gateway: &SmsGateway,
    invitations: &[Invitation],
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
) -> BatchReport {
    let total = invitations.len();
    let mut report = BatchReport::default();

    for (idx, invite) in invitations.iter().enumerate() {
        let recipient = invite.recipient.clone();

        let result = if cancel.is_cancelled() {
            SendResult::failed(recipient, CANCELLED)
        } else {
            match gateway
                .send(&invite.recipient.phone_number, &invite.message)
                .await
            {
                Ok(status) => SendResult::delivered(recipient, status),
                Err(SimchaError::Sms(reason)) => {
                    warn!("sms to {} failed: {reason}", invite.recipient.name);
                    SendResult::failed(recipient, reason)
                }
                Err(e) => {
                    warn!("sms to {} failed: {e}", invite.recipient.name);
                    SendResult::failed(recipient, e.to_string())
                }
            }
        };

        report.record(result);
        on_progress(Progress::new(idx + 1, total));
    }

    info!(
        "sms batch done: {}/{} delivered",
        report.successful.len(),
        total
    );
    report
}
