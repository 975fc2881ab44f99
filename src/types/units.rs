//! Unit Conversion Utilities
//!
//! Atomic coin units and the ledger's time base.

/// Atomic units per whole coin (12 decimal places)
pub const ATOMIC_UNITS_PER_COIN: u64 = 1_000_000_000_000;

/// Ledger times count seconds from 2010-01-01T00:00:00Z
pub const LEDGER_EPOCH_OFFSET: i64 = 1_262_304_000;

/// Convert atomic units to a coin string (e.g., "0.001000000000")
pub fn atomic_to_coin_string(amount: u64) -> String {
    format!(
        "{}.{:012}",
        amount / ATOMIC_UNITS_PER_COIN,
        amount % ATOMIC_UNITS_PER_COIN
    )
}

/// Convert atomic units to human-readable string
/// e.g., 1000000 -> "1,000,000 (0.000001000000)"
pub fn atomic_to_display(amount: u64) -> String {
    format!("{} ({})", format_with_commas(amount), atomic_to_coin_string(amount))
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Convert unix seconds to ledger time
pub fn unix_to_ledger_time(unix: i64) -> i64 {
    unix - LEDGER_EPOCH_OFFSET
}

/// Current time in the ledger's time base
pub fn ledger_time_now() -> i64 {
    unix_to_ledger_time(chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_to_coin() {
        assert_eq!(atomic_to_coin_string(0), "0.000000000000");
        assert_eq!(atomic_to_coin_string(1), "0.000000000001");
        assert_eq!(atomic_to_coin_string(ATOMIC_UNITS_PER_COIN), "1.000000000000");
        assert_eq!(atomic_to_coin_string(1_500_000_000_000), "1.500000000000");
    }

    #[test]
    fn test_display_format() {
        let display = atomic_to_display(1_000_000);
        assert!(display.contains("1,000,000"));
        assert!(display.contains("0.000001000000"));
    }

    #[test]
    fn test_ledger_time_round_trip() {
        assert_eq!(unix_to_ledger_time(LEDGER_EPOCH_OFFSET), 0);
        assert_eq!(unix_to_ledger_time(1_700_000_000), 437_696_000);
        assert!(ledger_time_now() > 0);
    }
}
