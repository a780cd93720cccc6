use rand::Rng;

/// Generate `bytes` random bytes, hex encoded
pub fn generate_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let buf: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(buf)
}

/// Generate a session nonce (16 bytes, hex encoded = 32 characters)
pub fn generate_sid() -> String {
    generate_hex(16)
}

/// Generate a document id
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a 4-digit activation code
pub fn generate_activation_code() -> String {
    let code: u16 = rand::thread_rng().gen_range(1000..10000);
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex() {
        let token = generate_hex(32);
        assert_eq!(token.len(), 64); // 32 bytes * 2 hex chars

        // Ensure randomness
        assert_ne!(token, generate_hex(32));
    }

    #[test]
    fn test_generate_sid() {
        let sid = generate_sid();
        assert_eq!(sid.len(), 32);
        assert!(sid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_activation_code_is_four_digits() {
        for _ in 0..100 {
            let code = generate_activation_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
