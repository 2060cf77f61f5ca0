/*!
 * Random Tokens
 * Non-cryptographic identifiers for folder names, trace ids and test channels
 */

use rand::Rng;

pub fn next_rand32() -> u32 {
    rand::thread_rng().gen()
}

pub fn next_rand64() -> u64 {
    rand::thread_rng().gen()
}

/// 16 lower-case hex characters, or 32 when `long`
pub fn rand_str(long: bool) -> String {
    if long {
        format!("{:016x}{:016x}", next_rand64(), next_rand64())
    } else {
        format!("{:016x}", next_rand64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_str_shape() {
        for (long, len) in [(false, 16), (true, 32)] {
            let token = rand_str(long);
            assert_eq!(token.len(), len);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_tokens_vary() {
        assert_ne!(rand_str(true), rand_str(true));
    }
}
