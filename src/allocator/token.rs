use crate::storage::UNIQID_MAX_LEN;
use chrono::Utc;
use uuid::Uuid;

const CLOCK_HEX_LEN: usize = 13;
const CLOCK_MASK: u64 = (1 << 52) - 1;

/// Disposable `uniqid` value: 13 hex digits of the microsecond clock
/// followed by random hex, 23 characters in total.
pub fn generate_token() -> String {
    let micros = Utc::now().timestamp_micros().unsigned_abs() & CLOCK_MASK;
    let random = Uuid::new_v4().simple().to_string();
    let tail = UNIQID_MAX_LEN - CLOCK_HEX_LEN;
    format!("{:0width$x}{}", micros, &random[..tail], width = CLOCK_HEX_LEN)
}
