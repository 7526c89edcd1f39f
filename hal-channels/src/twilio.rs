use crate::traits::{ChannelAdapter, InboundSource};
use crate::types::{Address, InboundMessage, MessageDirection, MessageId, OutboundMessage};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const TWILIO_MAX_BODY_CHARS: usize = 1500;

/// WhatsApp over the Twilio Messages REST API.
///
/// Inbound messages are read by polling the message list addressed to the
/// configured `whatsapp:` sender number; there is no webhook.
#[derive(Clone)]
pub struct TwilioWhatsAppAdapter {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_address: String,
}

impl TwilioWhatsAppAdapter {
    pub fn new(account_sid: &str, auth_token: &str, from_address: &str) -> Result<Self> {
        let account_sid = account_sid.trim();
        if account_sid.is_empty() {
            return Err(anyhow!("twilio account sid is required"));
        }
        let auth_token = auth_token.trim();
        if auth_token.is_empty() {
            return Err(anyhow!("twilio auth token is required"));
        }
        let from_address = from_address.trim();
        if from_address.is_empty() {
            return Err(anyhow!("twilio whatsapp sender address is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_address: from_address.to_string(),
        })
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    fn messages_url(&self) -> Result<Url> {
        Url::parse(&format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            self.account_sid
        ))
        .map_err(|e| anyhow!("invalid twilio messages URL: {e}"))
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for TwilioWhatsAppAdapter {
    fn channel_id(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
        let to = recipient_id.trim();
        if to.is_empty() {
            return Err(anyhow!("recipient_id (whatsapp:+E.164 address) is required"));
        }
        if message.content.trim().is_empty() {
            return Err(anyhow!("message content is empty"));
        }

        let url = self.messages_url()?;
        let form = [
            ("From", self.from_address.as_str()),
            ("To", to),
            ("Body", message.content.as_str()),
        ];
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!(
                "twilio send failed: status={} body={}",
                status,
                body
            ));
        }

        let sid = serde_json::from_str::<TwilioSendResponse>(&body)
            .map(|r| r.sid)
            .unwrap_or_default();
        tracing::info!(message_sid = %sid, to = %to, "sent whatsapp message");
        Ok(())
    }

    fn max_message_chars(&self) -> usize {
        TWILIO_MAX_BODY_CHARS
    }
}

#[async_trait::async_trait]
impl InboundSource for TwilioWhatsAppAdapter {
    async fn list_recent(
        &self,
        sent_after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InboundMessage>> {
        let url = self.messages_url()?;
        let sent_after = sent_after.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let page_size = limit.max(1).to_string();
        let response = self
            .http
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(&[
                ("To", self.from_address.as_str()),
                ("DateSent>", sent_after.as_str()),
                ("PageSize", page_size.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!(
                "twilio list messages failed: status={} body={}",
                status,
                body
            ));
        }

        let page: TwilioMessagePage = serde_json::from_str(&body)
            .map_err(|e| anyhow!("decode twilio message page: {e}"))?;
        Ok(page
            .messages
            .into_iter()
            .take(limit)
            .map(convert_twilio_message)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TwilioSendResponse {
    #[serde(default)]
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioMessagePage {
    #[serde(default)]
    messages: Vec<TwilioMessage>,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    body: Option<String>,
    direction: MessageDirection,
    #[serde(default)]
    date_sent: Option<String>,
}

fn convert_twilio_message(raw: TwilioMessage) -> InboundMessage {
    let sent_at = raw.date_sent.as_deref().and_then(parse_twilio_date);
    InboundMessage {
        message_id: MessageId::new(raw.sid),
        from: Address::new(raw.from),
        to: Address::new(raw.to),
        body: raw.body.unwrap_or_default(),
        direction: raw.direction,
        sent_at,
    }
}

/// Twilio stamps messages in RFC 2822 form, e.g. `Thu, 30 Jul 2015 20:12:33 +0000`.
fn parse_twilio_date(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc2822(raw.trim()) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            tracing::warn!(%error, date_sent = %raw, "unparseable twilio date_sent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_missing_credentials() {
        assert!(TwilioWhatsAppAdapter::new("", "token", "whatsapp:+1").is_err());
        assert!(TwilioWhatsAppAdapter::new("AC1", " ", "whatsapp:+1").is_err());
        assert!(TwilioWhatsAppAdapter::new("AC1", "token", "").is_err());
    }

    #[test]
    fn parses_rfc2822_dates_into_utc() {
        let parsed = parse_twilio_date("Thu, 30 Jul 2015 20:12:33 +0100").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2015, 7, 30, 19, 12, 33).unwrap());
        assert!(parse_twilio_date("yesterday").is_none());
    }

    #[test]
    fn message_page_converts_partial_payloads() {
        let page: TwilioMessagePage = serde_json::from_value(serde_json::json!({
            "messages": [
                {
                    "sid": "SM1",
                    "from": "whatsapp:+15550001",
                    "to": "whatsapp:+15550002",
                    "body": "hello",
                    "direction": "inbound",
                    "date_sent": "Thu, 30 Jul 2015 20:12:33 +0000"
                },
                {
                    "sid": "SM2",
                    "from": "whatsapp:+15550002",
                    "to": "whatsapp:+15550001",
                    "body": null,
                    "direction": "outbound-reply",
                    "date_sent": null
                }
            ]
        }))
        .unwrap();
        let messages: Vec<InboundMessage> =
            page.messages.into_iter().map(convert_twilio_message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_inbound());
        assert_eq!(messages[0].body, "hello");
        assert!(messages[0].sent_at.is_some());
        assert_eq!(messages[1].direction, MessageDirection::OutboundReply);
        assert_eq!(messages[1].body, "");
        assert!(messages[1].sent_at.is_none());
    }
}
