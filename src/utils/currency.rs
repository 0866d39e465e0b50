// Amounts are carried as integer cents everywhere (1 KSh = 100 cents).

/// Rounds to the nearest whole shilling, halves away from zero.
pub fn round_to_whole_shilling(cents: i64) -> i64 {
    let remainder = cents.rem_euclid(100);
    let floor = cents - remainder;
    if remainder >= 50 {
        floor + 100
    } else {
        floor
    }
}

pub fn format_cents_as_ksh(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("KSh {}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up_to_whole_shilling() {
        assert_eq!(round_to_whole_shilling(130_049), 130_000);
        assert_eq!(round_to_whole_shilling(130_050), 130_100);
        assert_eq!(round_to_whole_shilling(100_000), 100_000);
        assert_eq!(round_to_whole_shilling(99), 100);
    }

    #[test]
    fn formats_shillings_with_two_decimals() {
        assert_eq!(format_cents_as_ksh(10_000), "KSh 100.00");
        assert_eq!(format_cents_as_ksh(50), "KSh 0.50");
        assert_eq!(format_cents_as_ksh(123_405), "KSh 1234.05");
    }
}
