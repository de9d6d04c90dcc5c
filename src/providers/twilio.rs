//! Twilio call-status webhook types and the TwiML acknowledgement.
//!
//! Twilio posts form-encoded bodies with PascalCase field names and
//! expects a TwiML XML document back; an empty `<Response/>` means
//! "acknowledged, no further instructions".

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct TwilioCallStatus {
    #[serde(default, rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(default, rename = "CallStatus")]
    pub call_status: Option<String>,
    #[serde(default, rename = "From")]
    pub from: Option<String>,
    #[serde(default, rename = "To")]
    pub to: Option<String>,
    #[serde(default, rename = "Direction")]
    pub direction: Option<String>,
    #[serde(default, rename = "CallDuration")]
    pub call_duration: Option<String>,
    #[serde(default, rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(default, rename = "ErrorCode")]
    pub error_code: Option<String>,
}

impl TwilioCallStatus {
    /// Map Twilio's call lifecycle states onto the store's status values.
    /// A completed call with a recording is a voicemail drop.
    pub fn normalized_status(&self) -> &'static str {
        match self.call_status.as_deref() {
            Some("completed") => {
                if self.recording_url.is_some() {
                    "voicemail"
                } else {
                    "answered"
                }
            }
            Some("busy") | Some("no-answer") | Some("failed") | Some("canceled") => "failed",
            _ => "pending",
        }
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.call_duration.as_deref().and_then(|d| d.parse().ok())
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self.direction.as_deref(), Some("inbound") | None)
    }
}

/// The acknowledgement Twilio expects: an empty TwiML document.
pub fn twiml_empty_response() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#
}
