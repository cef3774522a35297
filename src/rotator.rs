use crate::error::ConfigError;
use crate::types::ContestedHour;

/// Pick the claimant for an hour: `pool[(hour + offset) mod len]`.
///
/// Identities are reused cyclically across hours; the offset lets several
/// dispatcher instances share one pool without colliding.
pub fn select_claimant(
    pool: &[String],
    hour: ContestedHour,
    offset: i64,
) -> Result<&str, ConfigError> {
    if pool.is_empty() {
        return Err(ConfigError::EmptyClaimantPool);
    }
    let len = pool.len() as i64;
    let idx = (i64::from(hour.value()) + offset).rem_euclid(len) as usize;
    Ok(pool[idx].as_str())
}

/// Shorten an identity for console output (`0x3Ee6ed7e…`).
pub fn abbreviate(claimant: &str) -> String {
    match claimant.char_indices().nth(10) {
        Some((end, _)) => format!("{}...", &claimant[..end]),
        None => claimant.to_string(),
    }
}
