use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `prefix` followed by `len` characters drawn uniformly, with replacement,
/// from `[a-z0-9]`. Uniqueness is not checked.
pub fn generate_name(prefix: &str, len: usize) -> String {
    generate_name_with_rng(&mut rand::thread_rng(), prefix, len)
}

pub fn generate_name_with_rng<R: Rng + ?Sized>(rng: &mut R, prefix: &str, len: usize) -> String {
    let mut out = String::with_capacity(prefix.len() + len);
    out.push_str(prefix);
    for _ in 0..len {
        let idx = rng.gen_range(0..ALPHABET.len());
        out.push(ALPHABET[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_suffix_length_and_alphabet() {
        for prefix in ["", "heart-classifier-", "ep-"] {
            for len in 1..12 {
                let name = generate_name(prefix, len);
                let suffix = name.strip_prefix(prefix).unwrap();
                assert_eq!(suffix.len(), len);
                assert!(suffix
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_zero_length_returns_prefix() {
        assert_eq!(generate_name("batch-", 0), "batch-");
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = generate_name_with_rng(&mut StdRng::seed_from_u64(7), "p-", 5);
        let b = generate_name_with_rng(&mut StdRng::seed_from_u64(7), "p-", 5);
        assert_eq!(a, b);
    }
}
