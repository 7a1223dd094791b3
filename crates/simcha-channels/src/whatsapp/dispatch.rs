//! Sequential relay dispatch with paced sends and streamed progress.

use super::send::Messenger;
use crate::pace::Pacer;
use serde::Serialize;
use simcha_core::error::SimchaError;
use simcha_core::invite::{Invitation, Recipient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reason recorded when the platform lookup finds no account for a number.
pub const NOT_ON_PLATFORM: &str = "Not on WhatsApp";

/// Reason recorded for recipients skipped after cancellation.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// One entry in the failed half of the batch partition.
#[derive(Debug, Clone, Serialize)]
pub struct RelayFailure {
    pub user: Recipient,
    pub error: String,
}

/// Final partition of a relay batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayOutcome {
    pub success: Vec<Recipient>,
    pub failed: Vec<RelayFailure>,
}

impl RelayOutcome {
    pub fn total(&self) -> usize {
        self.success.len() + self.failed.len()
    }
}

/// Events streamed to the caller while a batch runs. Serialized as tagged
/// JSON frames on the SSE response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    Progress {
        current: usize,
        total: usize,
        status: DeliveryStatus,
        user: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Complete {
        results: RelayOutcome,
    },
    Error {
        error: String,
    },
}

/// Relay every invitation in input order, one at a time.
///
/// Per recipient: resolve the number, send, record the outcome, emit one
/// `Progress` event. A lookup miss or send failure never aborts the batch.
/// After a successful send with more recipients remaining, pause for a
/// random delay in `[min, max)` ms so consecutive sends never burst.
/// Cancellation (or a dropped event receiver) marks every remaining
/// recipient failed without touching the network, keeping
/// `success + failed == total`. A terminal `Complete` event carrying the
/// full partition is emitted before returning.
pub async fn relay_batch(
    messenger: &dyn Messenger,
    pacer: &dyn Pacer,
    invitations: &[Invitation],
    delay_ms: (u64, u64),
    cancel: &CancellationToken,
    events: &mpsc::Sender<RelayEvent>,
) -> RelayOutcome {
    let total = invitations.len();
    let mut outcome = RelayOutcome::default();
    let mut receiver_gone = false;

    for (idx, invite) in invitations.iter().enumerate() {
        let current = idx + 1;
        let recipient = invite.recipient.clone();

        let result = if cancel.is_cancelled() || receiver_gone {
            Err(CANCELLED.to_string())
        } else {
            attempt(messenger, invite).await
        };

        let (status, error) = match result {
            Ok(()) => {
                outcome.success.push(recipient.clone());
                (DeliveryStatus::Success, None)
            }
            Err(reason) => {
                warn!("whatsapp to {} failed: {reason}", recipient.name);
                outcome.failed.push(RelayFailure {
                    user: recipient.clone(),
                    error: reason.clone(),
                });
                (DeliveryStatus::Failed, Some(reason))
            }
        };

        if !receiver_gone {
            let event = RelayEvent::Progress {
                current,
                total,
                status,
                user: recipient.name.clone(),
                error,
            };
            if events.send(event).await.is_err() {
                // Client hung up mid-stream; stop sending, record the rest
                // as cancelled so the partition still accounts for everyone.
                warn!("relay event receiver dropped, cancelling remainder");
                receiver_gone = true;
            }
        }

        let delivered = status == DeliveryStatus::Success;
        if delivered && current < total && !cancel.is_cancelled() && !receiver_gone {
            pacer.pause(delay_ms.0, delay_ms.1).await;
        }
    }

    info!(
        "whatsapp batch done: {}/{} delivered",
        outcome.success.len(),
        total
    );

    let _ = events
        .send(RelayEvent::Complete {
            results: outcome.clone(),
        })
        .await;

    outcome
}

async fn attempt(messenger: &dyn Messenger, invite: &Invitation) -> Result<(), String> {
    let address = match messenger.resolve(&invite.recipient.phone_number).await {
        Ok(Some(address)) => address,
        Ok(None) => return Err(NOT_ON_PLATFORM.to_string()),
        Err(e) => return Err(reason_of(e)),
    };

    messenger
        .send_text(&address, &invite.message)
        .await
        .map_err(reason_of)
}

fn reason_of(e: SimchaError) -> String {
    match e {
        SimchaError::WhatsApp(reason) => reason,
        other => other.to_string(),
    }
}
