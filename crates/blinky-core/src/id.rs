//! Local identifier generation
//!
//! Ids look like `id_<bs58 of a random uuid>_<base36 millis>`. The `id_`
//! prefix keeps them visually distinct from ids assigned by the remote store.

use uuid::Uuid;

/// Prefix carried by every locally generated id
pub const LOCAL_ID_PREFIX: &str = "id_";

/// Generate a new section id
pub fn generate_id() -> String {
    let random = bs58::encode(Uuid::new_v4().as_bytes()).into_string();
    format!(
        "{}{}_{}",
        LOCAL_ID_PREFIX,
        random,
        to_base36(crate::models::now_millis().max(0) as u64)
    )
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
