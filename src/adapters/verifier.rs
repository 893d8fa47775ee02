use {
    crate::domain::{
        error::SyncError,
        event::{RawEvent, VerifiedEvent},
        id::EventId,
    },
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Checks `Stripe-Signature` over the raw request body and parses the event.
///
/// Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The signed
/// payload is `"<t>." + body`. Any matching `v1` is accepted.
#[derive(Clone)]
pub struct EventVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SyncError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    SyncError::Verification(format!("bad signature timestamp: {value}"))
                })?);
            }
            // Undecodable entries are skipped; only a valid one can match anyway.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SyncError::Verification("signature has no timestamp".into()))?;
    if signatures.is_empty() {
        return Err(SyncError::Verification("signature has no v1 entry".into()));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

impl EventVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into().into_bytes(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<VerifiedEvent, SyncError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<VerifiedEvent, SyncError> {
        let header = header
            .ok_or_else(|| SyncError::Verification(format!("missing {SIGNATURE_HEADER} header")))?;
        let parsed = parse_header(header)?;

        if (now - parsed.timestamp).abs() > self.tolerance_secs {
            return Err(SyncError::Verification(format!(
                "signature timestamp {} outside tolerance of {}s",
                parsed.timestamp, self.tolerance_secs
            )));
        }

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SyncError::Config(format!("webhook secret: {e}")))?;
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = parsed
            .signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());
        if !matched {
            return Err(SyncError::Verification("signature mismatch".into()));
        }

        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| SyncError::Verification(format!("malformed event payload: {e}")))?;
        let id = EventId::new(raw.id).map_err(|e| SyncError::Verification(e.to_string()))?;
        Ok(VerifiedEvent::new(
            id,
            raw.event_type,
            raw.created,
            raw.livemode,
            raw.data.object,
        ))
    }
}
