//! Signal messaging through the appliance
//!
//! The appliance owns the transport and the message store; this side
//! only submits sends, fetches transcripts, and walks the two-step
//! number registration. Contacts are shape-checked before a request
//! goes out so an obviously malformed one never reaches the wire.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::session::EventBus;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

/// Contacts are `"Name +NUMBER"`, the appliance's directory format.
static CONTACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^/]* \+[0-9]+$").unwrap());

/// Bare number form used during registration.
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[0-9]+$").unwrap());

/// Delivery channel for the registration verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Sms,
    Voice,
}

impl VerificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationType::Sms => "sms",
            VerificationType::Voice => "voice",
        }
    }
}

pub struct Messaging {
    gateway: Arc<Gateway>,
    bus: EventBus,
}

impl Messaging {
    pub fn new(gateway: Arc<Gateway>, bus: EventBus) -> Messaging {
        Messaging { gateway, bus }
    }

    /// Sends a text message to `contact`.
    pub async fn send(&self, contact: &str, msg: &str) -> Result<(), GatewayError> {
        self.check("messaging.send", &CONTACT, contact, "contact")?;
        if msg.is_empty() {
            return Err(self.shape_error("messaging.send", "refusing to send an empty message"));
        }
        let body = json!({"contact": contact, "msg": msg});
        let res = self
            .gateway
            .call(ApiMethod::MsgSend, Verb::Post, Some(body))
            .await;
        self.done("messaging.send", res)
    }

    /// Sends `msg` with a file already on the appliance attached.
    pub async fn send_attachment(
        &self,
        contact: &str,
        msg: &str,
        attachment: &str,
    ) -> Result<(), GatewayError> {
        self.check("messaging.send", &CONTACT, contact, "contact")?;
        let body = json!({"contact": contact, "msg": msg, "attachment": attachment});
        let res = self
            .gateway
            .call(ApiMethod::MsgSend, Verb::Post, Some(body))
            .await;
        self.done("messaging.send", res)
    }

    /// Fetches the tail of the conversation transcript with `contact`.
    pub async fn history(&self, contact: &str) -> Result<String, GatewayError> {
        self.check("messaging.history", &CONTACT, contact, "contact")?;
        let body = json!({"contact": contact});
        match self
            .gateway
            .call(ApiMethod::MsgHistory, Verb::Post, Some(body))
            .await
        {
            Ok(payload) => payload.as_str().map(str::to_string).ok_or_else(|| {
                let err = GatewayError::malformed("message history", "not text");
                self.bus.report("messaging.history", &err);
                err
            }),
            Err(err) => {
                self.bus.report("messaging.history", &err);
                Err(err)
            }
        }
    }

    /// Step one of registration: ask for a verification code on `number`.
    pub async fn request_verification(
        &self,
        number: &str,
        via: VerificationType,
    ) -> Result<(), GatewayError> {
        self.check("messaging.register", &NUMBER, number, "number")?;
        let body = json!({"contact": number, "type": via.as_str()});
        let res = self
            .gateway
            .call(ApiMethod::MsgRegister, Verb::Post, Some(body))
            .await;
        self.done("messaging.register", res)
    }

    /// Step two of registration: submit the received code.
    pub async fn confirm_verification(
        &self,
        number: &str,
        code: &str,
    ) -> Result<(), GatewayError> {
        self.check("messaging.register", &NUMBER, number, "number")?;
        if code.is_empty() {
            return Err(self.shape_error(
                "messaging.register",
                "please insert a valid verification code",
            ));
        }
        let body = json!({"contact": number, "code": code});
        let res = self
            .gateway
            .call(ApiMethod::MsgRegister, Verb::Post, Some(body))
            .await;
        self.done("messaging.register", res)
    }

    fn check(
        &self,
        source: &str,
        pattern: &Regex,
        value: &str,
        what: &str,
    ) -> Result<(), GatewayError> {
        if pattern.is_match(value) {
            Ok(())
        } else {
            Err(self.shape_error(source, format!("invalid {what} {value:?}")))
        }
    }

    fn shape_error(&self, source: &str, msg: impl std::fmt::Display) -> GatewayError {
        let err = GatewayError::Client(anyhow::anyhow!("{msg}"));
        self.bus.report(source, &err);
        err
    }

    fn done(
        &self,
        source: &str,
        res: Result<serde_json::Value, GatewayError>,
    ) -> Result<(), GatewayError> {
        match res {
            Ok(_) => Ok(()),
            Err(err) => {
                self.bus.report(source, &err);
                Err(err)
            }
        }
    }
}

/// Display name of a directory contact, `"Dee +15550100"` -> `"Dee"`.
pub fn contact_name(contact: &str) -> &str {
    match contact.rfind(" +") {
        Some(pos) if !contact[..pos].is_empty() => &contact[..pos],
        _ => contact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_pattern_requires_name_and_number() {
        assert!(CONTACT.is_match("Dee +15550100"));
        assert!(CONTACT.is_match(" +15550100"));
        assert!(!CONTACT.is_match("+15550100"));
        assert!(!CONTACT.is_match("Dee 15550100"));
        assert!(!CONTACT.is_match("a/b +15550100"));
    }

    #[test]
    fn number_pattern_is_digits_after_plus() {
        assert!(NUMBER.is_match("+15550100"));
        assert!(!NUMBER.is_match("15550100"));
        assert!(!NUMBER.is_match("+1555 0100"));
        assert!(!NUMBER.is_match("Dee +15550100"));
    }

    #[test]
    fn contact_name_strips_the_number() {
        assert_eq!(contact_name("Dee +15550100"), "Dee");
        assert_eq!(contact_name("Dee Dee +15550100"), "Dee Dee");
        assert_eq!(contact_name("+15550100"), "+15550100");
        assert_eq!(contact_name("no number here"), "no number here");
    }

    #[test]
    fn verification_types_match_the_wire_values() {
        assert_eq!(VerificationType::Sms.as_str(), "sms");
        assert_eq!(VerificationType::Voice.as_str(), "voice");
    }
}
