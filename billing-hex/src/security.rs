//! Signing primitives shared by the gateway adapters.
//!
//! Every signed gateway follows the same shape: canonicalize some fields into
//! one string, hash it (optionally keyed), and compare against what the peer
//! sent. [`verify_signature`] is that shape; the gateway modules only supply
//! the canonical string and the digest.

use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a Stripe webhook timestamp.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

/// Lower-case hex digest of `input`.
pub fn digest_hex<D: Digest>(input: &[u8]) -> String {
    hex::encode(D::digest(input))
}

/// Lower-case hex HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Recomputes a signature with `sign` and compares it to `provided`.
///
/// Hex case is ignored; the comparison itself is constant-time.
pub fn verify_signature<F>(provided: &str, sign: F) -> bool
where
    F: FnOnce() -> String,
{
    let expected = sign().to_ascii_lowercase();
    let provided = provided.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Constant-time string equality, for shared secrets.
pub fn secure_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Click
// ─────────────────────────────────────────────────────────────────────────────

/// Fields Click signs on both callback stages.
#[derive(Debug, Clone, Copy)]
pub struct ClickSignFields<'a> {
    pub click_trans_id: i64,
    pub service_id: i64,
    pub secret_key: &'a str,
    pub merchant_trans_id: &'a str,
    /// Present on the complete stage only.
    pub merchant_prepare_id: Option<i64>,
    /// Minor units, as stored on the transaction.
    pub amount: i64,
    pub action: i32,
    pub sign_time: &'a str,
}

/// `md5(click_trans_id service_id secret merchant_trans_id [prepare_id] amount action sign_time)`.
pub fn click_sign(f: &ClickSignFields<'_>) -> String {
    let prepare = f
        .merchant_prepare_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    let canonical = format!(
        "{}{}{}{}{}{}{}{}",
        f.click_trans_id,
        f.service_id,
        f.secret_key,
        f.merchant_trans_id,
        prepare,
        f.amount,
        f.action,
        f.sign_time
    );
    digest_hex::<Md5>(canonical.as_bytes())
}

/// Digest for the `Auth` header of the Click merchant API.
pub fn click_auth_digest(timestamp: i64, secret_key: &str) -> String {
    digest_hex::<Sha1>(format!("{timestamp}{secret_key}").as_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// Octo
// ─────────────────────────────────────────────────────────────────────────────

/// `SHA1(unique_key + octo_payment_UUID + status)`, upper-case hex.
pub fn octo_sign(unique_key: &str, payment_uuid: &str, status: &str) -> String {
    digest_hex::<Sha1>(format!("{unique_key}{payment_uuid}{status}").as_bytes()).to_ascii_uppercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Stripe
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignature {
    pub timestamp: i64,
    pub v1: Vec<String>,
}

impl StripeSignature {
    /// Parses `t=<unix>,v1=<hex>[,v1=<hex>...]`. Unknown schemes are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut v1 = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = t.parse().ok(),
                Some(("v1", sig)) => v1.push(sig.to_string()),
                _ => {}
            }
        }
        Some(Self {
            timestamp: timestamp?,
            v1,
        })
    }
}

/// Builds a header value the way Stripe does. Used by tests and local tooling.
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signed = [timestamp.to_string().as_bytes(), b".", payload].concat();
    format!("t={},v1={}", timestamp, hmac_sha256_hex(&signed, secret))
}

/// Verifies a Stripe webhook body against its signature header.
pub fn verify_stripe_signature(payload: &[u8], header: &str, secret: &str) -> bool {
    let Some(sig) = StripeSignature::parse(header) else {
        return false;
    };
    let skew = Utc::now().timestamp().abs_diff(sig.timestamp);
    if skew > STRIPE_TOLERANCE_SECS.unsigned_abs() {
        tracing::warn!(skew_secs = skew, "stripe webhook timestamp outside tolerance");
        return false;
    }
    let signed = [sig.timestamp.to_string().as_bytes(), b".", payload].concat();
    let expected = hmac_sha256_hex(&signed, secret);
    sig.v1
        .iter()
        .any(|candidate| verify_signature(candidate, || expected.clone()))
}
