// utils/display_id.rs
use rand::distr::Alphanumeric;
use rand::Rng;

const CODE_LENGTH: usize = 6;

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| rng.sample(Alphanumeric) as char)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Human-readable order code, e.g. `ORD-7K2QXM`.
pub fn generate_job_code() -> String {
    format!("ORD-{}", random_code())
}

/// Human-readable user code; the prefix encodes the role (`CL`, `FL`, `AD`, `AO`).
pub fn generate_user_code(prefix: &str) -> String {
    format!("{}-{}", prefix, random_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_codes_have_prefix_and_length() {
        let code = generate_job_code();
        assert!(code.starts_with("ORD-"));
        assert_eq!(code.len(), 4 + CODE_LENGTH);
        assert!(code[4..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn user_codes_use_given_prefix() {
        assert!(generate_user_code("FL").starts_with("FL-"));
    }
}
