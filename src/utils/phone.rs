use std::sync::OnceLock;

use regex::Regex;

fn local_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\+?254|0)?([17][0-9]{8})$").expect("phone regex is valid")
    })
}

/// Normalize a Kenyan mobile number into the `254XXXXXXXXX` form the
/// push-payment gateway expects.
///
/// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `7XXXXXXXX`, `1XXXXXXXX`,
/// `2547XXXXXXXX` and `+2547XXXXXXXX`. Spaces and dashes are ignored.
pub fn normalize_msisdn(input: &str) -> Result<String, String> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    local_pattern()
        .captures(&compact)
        .and_then(|caps| caps.get(1))
        .map(|subscriber| format!("254{}", subscriber.as_str()))
        .ok_or_else(|| format!("Invalid phone number: {}", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_local_formats() {
        assert_eq!(normalize_msisdn("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("0112345678").unwrap(), "254112345678");
        assert_eq!(normalize_msisdn("712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("112345678").unwrap(), "254112345678");
    }

    #[test]
    fn accepts_international_formats() {
        assert_eq!(normalize_msisdn("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("+254 712 345 678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("0712-345-678").unwrap(), "254712345678");
    }

    #[test]
    fn rejects_other_numbers() {
        assert!(normalize_msisdn("0812345678").is_err());
        assert!(normalize_msisdn("07123456").is_err());
        assert!(normalize_msisdn("2557123456789").is_err());
        assert!(normalize_msisdn("").is_err());
    }
}
