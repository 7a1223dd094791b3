use super::dispatch::{relay_batch, DeliveryStatus, RelayEvent, CANCELLED, NOT_ON_PLATFORM};
use super::send::Messenger;
use crate::pace::Pacer;
use async_trait::async_trait;
use simcha_core::error::SimchaError;
use simcha_core::invite::{Invitation, Recipient};
use simcha_core::phone;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Messenger double: numbers in `unknown` resolve to nothing, numbers in
/// `failing` fail at send time, everything else is delivered and recorded.
struct MockMessenger {
    unknown: Vec<String>,
    failing: Vec<String>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockMessenger {
    fn new() -> Self {
        Self {
            unknown: Vec::new(),
            failing: Vec::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn resolve(&self, phone_number: &str) -> Result<Option<String>, SimchaError> {
        if self.unknown.iter().any(|p| p == phone_number) {
            return Ok(None);
        }
        match phone::to_international(phone_number) {
            Some(digits) => Ok(Some(format!("{digits}@s.whatsapp.net"))),
            None => Ok(None),
        }
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), SimchaError> {
        if self.failing.iter().any(|p| address.starts_with(p)) {
            return Err(SimchaError::WhatsApp("whatsapp send failed: 500".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string()));
        Ok(())
    }
}

/// Pacer double that records each requested delay window without sleeping.
struct RecordingPacer {
    pauses: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl RecordingPacer {
    fn new() -> (Self, Arc<Mutex<Vec<(u64, u64)>>>) {
        let pauses = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                pauses: Arc::clone(&pauses),
            },
            pauses,
        )
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, min_ms: u64, max_ms: u64) {
        self.pauses.lock().unwrap().push((min_ms, max_ms));
    }
}

fn invitations(phones: &[&str]) -> Vec<Invitation> {
    phones
        .iter()
        .enumerate()
        .map(|(i, phone)| {
            Invitation::new(
                "https://w.example.com",
                "{name}: {link}",
                Recipient {
                    id: format!("g{i}"),
                    name: format!("Guest {i}"),
                    phone_number: phone.to_string(),
                },
            )
        })
        .collect()
}

async fn drain(mut rx: mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_relay_all_delivered() {
    let messenger = MockMessenger::new();
    let (pacer, _) = RecordingPacer::new();
    let invites = invitations(&["0501234567", "0521234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let outcome = relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);

    assert_eq!(outcome.success.len(), 2);
    assert_eq!(outcome.failed.len(), 0);
    assert_eq!(outcome.total(), 2);

    let sent = messenger.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "972501234567@s.whatsapp.net");
    assert!(sent[0].1.contains("Guest 0"));

    let events = drain(rx).await;
    assert_eq!(events.len(), 3, "two progress frames plus complete");
    assert!(matches!(events[2], RelayEvent::Complete { .. }));
}

#[tokio::test]
async fn test_relay_lookup_miss_skips_send_and_continues() {
    // A number with no account fails without a send; the next one still goes.
    let mut messenger = MockMessenger::new();
    messenger.unknown.push("0501234567".into());
    let (pacer, _) = RecordingPacer::new();
    let invites = invitations(&["0501234567", "0521234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let outcome = relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);

    assert_eq!(outcome.success.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].error, NOT_ON_PLATFORM);
    assert_eq!(outcome.failed[0].user.name, "Guest 0");
    assert_eq!(
        messenger.sent.lock().unwrap().len(),
        1,
        "no send attempted for the missing account"
    );

    let events = drain(rx).await;
    match &events[0] {
        RelayEvent::Progress { status, error, .. } => {
            assert_eq!(*status, DeliveryStatus::Failed);
            assert_eq!(error.as_deref(), Some(NOT_ON_PLATFORM));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_relay_invalid_number_is_not_on_platform() {
    let messenger = MockMessenger::new();
    let (pacer, _) = RecordingPacer::new();
    let invites = invitations(&["abc"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let outcome = relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);
    drain(rx).await;

    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].error, NOT_ON_PLATFORM);
}

#[tokio::test]
async fn test_relay_send_failure_continues() {
    let mut messenger = MockMessenger::new();
    messenger.failing.push("972501234567".into());
    let (pacer, _) = RecordingPacer::new();
    let invites = invitations(&["0501234567", "0521234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let outcome = relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);
    drain(rx).await;

    assert_eq!(outcome.success.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failed[0].error.contains("whatsapp send failed"));
}

#[tokio::test]
async fn test_relay_pauses_only_between_successful_sends() {
    // fail, success, success, success: one failure up front, then three
    // deliveries. Pauses happen after a delivery with more work left, so
    // exactly two.
    let mut messenger = MockMessenger::new();
    messenger.failing.push("972501111111".into());
    let (pacer, pauses) = RecordingPacer::new();
    let invites = invitations(&["0501111111", "0502222222", "0503333333", "0504444444"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);
    drain(rx).await;

    let pauses = pauses.lock().unwrap();
    assert_eq!(pauses.len(), 2);
    for &(min, max) in pauses.iter() {
        assert_eq!((min, max), (3000, 8000));
    }
}

#[tokio::test]
async fn test_relay_no_pause_after_last_send() {
    let messenger = MockMessenger::new();
    let (pacer, pauses) = RecordingPacer::new();
    let invites = invitations(&["0501234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);
    drain(rx).await;

    assert!(pauses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_relay_progress_sequence() {
    let messenger = MockMessenger::new();
    let (pacer, _) = RecordingPacer::new();
    let invites = invitations(&["0501234567", "0521234567", "0541234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    relay_batch(&messenger, &pacer, &invites, (0, 1), &cancel, &tx).await;
    drop(tx);

    let events = drain(rx).await;
    assert_eq!(events.len(), 4);
    for (i, ev) in events[..3].iter().enumerate() {
        match ev {
            RelayEvent::Progress {
                current,
                total,
                status,
                user,
                ..
            } => {
                assert_eq!(*current, i + 1);
                assert_eq!(*total, 3);
                assert_eq!(*status, DeliveryStatus::Success);
                assert_eq!(user, &format!("Guest {i}"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    match &events[3] {
        RelayEvent::Complete { results } => {
            assert_eq!(results.success.len(), 3);
            assert_eq!(results.failed.len(), 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_relay_cancellation_marks_remainder_failed() {
    let messenger = MockMessenger::new();
    let (pacer, pauses) = RecordingPacer::new();
    let invites = invitations(&["0501234567", "0521234567"]);
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = relay_batch(&messenger, &pacer, &invites, (3000, 8000), &cancel, &tx).await;
    drop(tx);

    assert_eq!(outcome.failed.len(), 2);
    assert_eq!(outcome.total(), 2);
    for failure in &outcome.failed {
        assert_eq!(failure.error, CANCELLED);
    }
    assert!(messenger.sent.lock().unwrap().is_empty());
    assert!(pauses.lock().unwrap().is_empty());

    // The terminal complete event is still emitted.
    let events = drain(rx).await;
    assert!(matches!(events.last(), Some(RelayEvent::Complete { .. })));
}

#[tokio::test]
async fn test_relay_event_json_shape() {
    let ev = RelayEvent::Progress {
        current: 1,
        total: 2,
        status: DeliveryStatus::Failed,
        user: "Guest 0".into(),
        error: Some(NOT_ON_PLATFORM.into()),
    };
    let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["type"], "progress");
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"], NOT_ON_PLATFORM);

    let ok = RelayEvent::Progress {
        current: 2,
        total: 2,
        status: DeliveryStatus::Success,
        user: "Guest 1".into(),
        error: None,
    };
    let json: serde_json::Value = serde_json::to_value(&ok).unwrap();
    assert!(json.get("error").is_none(), "error omitted on success");
}
