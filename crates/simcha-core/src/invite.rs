//! Invitation data model: recipients, personalized links, and batch tallies.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// A guest record reduced to what sending needs.
///
/// Wire form is `{id, name, phoneNumber}`, matching the relay's HTTP body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
}

/// Personalized RSVP link: `{base_url}/rsvp/{id}`.
pub fn rsvp_link(base_url: &str, id: &str) -> String {
    format!("{}/rsvp/{}", base_url.trim_end_matches('/'), id)
}

/// One invitation, built fresh per send attempt and never persisted.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub recipient: Recipient,
    pub url: String,
    pub message: String,
}

impl Invitation {
    /// Build the link and substitute `{name}`/`{link}` into the template.
    /// Missing id or name produce empty substitutions, not an error.
    pub fn new(base_url: &str, template: &str, recipient: Recipient) -> Self {
        let url = rsvp_link(base_url, &recipient.id);
        let message = template
            .replace("{name}", &recipient.name)
            .replace("{link}", &url);
        Self {
            recipient,
            url,
            message,
        }
    }
}

/// Terminal outcome of one send attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub recipient: Recipient,
    pub success: bool,
    /// Gateway-reported recipient count, when the gateway answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl SendResult {
    pub fn delivered(recipient: Recipient, status: i32) -> Self {
        Self {
            recipient,
            success: true,
            status: Some(status),
            error: None,
            sent_at: Utc::now(),
        }
    }

    pub fn failed(recipient: Recipient, error: impl Into<String>) -> Self {
        Self {
            recipient,
            success: false,
            status: None,
            error: Some(error.into()),
            sent_at: Utc::now(),
        }
    }
}

/// Batch tally. Every recipient lands in exactly one of the two partitions,
/// so `total()` equals the input size once a batch completes.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub successful: Vec<SendResult>,
    pub failed: Vec<SendResult>,
}

impl BatchReport {
    pub fn record(&mut self, result: SendResult) {
        if result.success {
            self.successful.push(result);
        } else {
            self.failed.push(result);
        }
    }

    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BatchReport", 3)?;
        s.serialize_field("successful", &self.successful)?;
        s.serialize_field("failed", &self.failed)?;
        s.serialize_field("total", &self.total())?;
        s.end()
    }
}

/// Progress snapshot emitted after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
}

impl Progress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}
