/// Expand a lowercase hex digest into its binary string form, four bits per
/// character. Returns `None` on any non-hex character.
pub fn hex_to_binary(hex: &str) -> Option<String> {
    let mut binary = String::with_capacity(hex.len() * 4);
    for c in hex.chars() {
        let bits = match c {
            '0' => "0000",
            '1' => "0001",
            '2' => "0010",
            '3' => "0011",
            '4' => "0100",
            '5' => "0101",
            '6' => "0110",
            '7' => "0111",
            '8' => "1000",
            '9' => "1001",
            'a' => "1010",
            'b' => "1011",
            'c' => "1100",
            'd' => "1101",
            'e' => "1110",
            'f' => "1111",
            _ => return None,
        };
        binary.push_str(bits);
    }
    Some(binary)
}

/// Whether the digest's binary expansion starts with `difficulty` zero bits.
/// A malformed digest fails the match, it never panics.
pub fn hash_matches_difficulty(hash: &str, difficulty: u32) -> bool {
    let Some(binary) = hex_to_binary(hash) else {
        return false;
    };
    if (binary.len() as u64) < u64::from(difficulty) {
        return false;
    }
    binary.bytes().take(difficulty as usize).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_hex_digits_to_four_bits_each() {
        assert_eq!(hex_to_binary("0f").as_deref(), Some("00001111"));
        assert_eq!(hex_to_binary("a").as_deref(), Some("1010"));
        assert_eq!(hex_to_binary("").as_deref(), Some(""));
    }

    #[test]
    fn rejects_non_hex_input() {
        assert_eq!(hex_to_binary("0g"), None);
        assert_eq!(hex_to_binary("FF"), None); // digests are lowercase
    }

    #[test]
    fn matches_required_leading_zero_bits() {
        assert!(hash_matches_difficulty("0f", 0));
        assert!(hash_matches_difficulty("0f", 4));
        assert!(!hash_matches_difficulty("0f", 5));
        assert!(hash_matches_difficulty("ff", 0));
        assert!(!hash_matches_difficulty("ff", 1));
    }

    #[test]
    fn fails_closed_on_malformed_digests() {
        assert!(!hash_matches_difficulty("not a digest", 0));
        assert!(!hash_matches_difficulty("0f", 9)); // longer than the expansion
    }
}
