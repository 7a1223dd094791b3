//! SMS gateway client (sms4free).
//!
//! One HTTP call per message. The gateway answers `{status, message}`: a
//! positive status is the number of recipients reached, non-positive
//! statuses map to a fixed table of Hebrew reasons.

pub mod dispatch;


use async_trait::async_trait;
use serde_json::{json, Value};
use simcha_core::{config::SmsConfig, error::SimchaError, phone};
use std::time::Duration;
use tracing::debug;

const SEND_URL: &str = "https://api.sms4free.co.il/ApiSMS/v2/SendSMS";
const BALANCE_URL: &str = "https://api.sms4free.co.il/ApiSMS/AvailableSMS";

/// Synthetic reason for numbers failing the regional pattern; recorded
/// without any gateway call.
pub const INVALID_NUMBER: &str = "Invalid phone number";

/// Fallback reason for gateway status codes outside the known table.
pub const GENERIC_FAILURE: &str = "שליחת ההודעה נכשלה";

/// Map a non-positive gateway status code to its fixed reason string.
/// Unknown codes get the generic fallback rather than failing the mapping.
pub fn status_reason(status: i32) -> &'static str {
    match status {
        0 => "שגיאה כללית",
        -1 => "מפתח, שם משתמש או סיסמה שגויים",
        -2 => "שם שולח שגוי",
        -3 => "לא נמצאו נמענים",
        -4 => "אין יתרת הודעות מספקת",
        -5 => "הודעה לא תקינה",
        -6 => "שם שולח לא מאומת",
        _ => GENERIC_FAILURE,
    }
}

/// HTTP seam for the gateway, mockable in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, SimchaError>;
}

/// reqwest-backed transport with a bounded per-call timeout, so a hung
/// gateway call cannot stall a batch indefinitely.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SimchaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SimchaError::Sms(format!("http client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, SimchaError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SimchaError::Sms(format!("gateway request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SimchaError::Sms(format!(
                "gateway returned {status}: {text}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| SimchaError::Sms(format!("gateway response parse failed: {e}")))
    }
}

/// Client for the hosted SMS gateway.
pub struct SmsGateway {
    config: SmsConfig,
    transport: Box<dyn Transport>,
}

impl SmsGateway {
    /// Build a gateway client. Missing credentials fail construction up
    /// front; no network is attempted.
    pub fn new(config: SmsConfig) -> Result<Self, SimchaError> {
        Self::with_transport(config, Box::new(HttpTransport::new()?))
    }

    pub fn with_transport(
        config: SmsConfig,
        transport: Box<dyn Transport>,
    ) -> Result<Self, SimchaError> {
        if !config.is_configured() {
            return Err(SimchaError::Config(
                "sms gateway credentials missing (key/user/pass/sender)".into(),
            ));
        }
        Ok(Self { config, transport })
    }

    /// Send one message: exactly one outbound message per call, no retry.
    ///
    /// Returns the gateway's recipient count on success. Every failure path
    /// resolves to `SimchaError::Sms` carrying the reason string — an
    /// invalid number short-circuits before any gateway call.
    pub async fn send(&self, to: &str, message: &str) -> Result<i32, SimchaError> {
        let local = phone::format_local(to);
        if !phone::is_valid(&local) {
            return Err(SimchaError::Sms(INVALID_NUMBER.into()));
        }

        let body = json!({
            "key": self.config.key,
            "user": self.config.user,
            "pass": self.config.pass,
            "sender": self.config.sender,
            "recipient": local,
            "msg": message,
        });

        let reply = self.transport.post_json(SEND_URL, &body).await?;
        let status = reply
            .get("status")
            .and_then(Value::as_i64)
            .ok_or_else(|| SimchaError::Sms("gateway reply missing status".into()))?
            as i32;

        if status > 0 {
            debug!("sms delivered to {local} (recipients: {status})");
            Ok(status)
        } else {
            Err(SimchaError::Sms(status_reason(status).to_string()))
        }
    }

    /// Remaining message balance for the account.
    pub async fn balance(&self) -> Result<i32, SimchaError> {
        let body = json!({
            "key": self.config.key,
            "user": self.config.user,
            "pass": self.config.pass,
        });

        let reply = self.transport.post_json(BALANCE_URL, &body).await?;
        reply
            .get("status")
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .ok_or_else(|| SimchaError::Sms("gateway reply missing status".into()))
    }
}
