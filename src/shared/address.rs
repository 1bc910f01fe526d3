/// Abbreviate a hex address as 0x1234...abcd for compact display.
pub fn abbreviate_address(addr: &str) -> String {
    let chars = addr.chars().count();
    if chars <= 10 {
        return addr.to_string();
    }
    let head: String = addr.chars().take(6).collect();
    let tail: String = addr.chars().skip(chars - 4).collect();
    format!("{head}...{tail}")
}

/// Return true for strict 20-byte EVM addresses in 0x-prefixed hex format.
pub fn is_evm_address(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.len() != 42 || !(trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
        return false;
    }
    trimmed
        .as_bytes()
        .iter()
        .skip(2)
        .all(|b| char::from(*b).is_ascii_hexdigit())
}

/// Canonical map key for an address: trimmed, lower-cased, `0x` prefixed.
pub fn normalize_address(value: &str) -> String {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{lower}")
    }
}

/// Like [`normalize_address`] but rejects anything that is not a 20-byte address.
pub fn parse_evm_address(value: &str) -> Result<String, String> {
    let normalized = normalize_address(value);
    if !is_evm_address(&normalized) {
        return Err(format!("Invalid wallet address: {value}"));
    }
    Ok(normalized)
}

/// First `count` hex digits after the `0x` prefix.
pub fn hex_prefix(addr: &str, count: usize) -> &str {
    let body = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    let end = body
        .char_indices()
        .nth(count)
        .map(|(idx, _)| idx)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_prefix() {
        assert_eq!(
            normalize_address(" 0xABCDEF0000000000000000000000000000000001 "),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(normalize_address("AbC"), "0xabc");
    }

    #[test]
    fn rejects_short_or_non_hex_addresses() {
        assert!(parse_evm_address("0x1234").is_err());
        assert!(parse_evm_address("0xzz00000000000000000000000000000000000000").is_err());
        assert!(parse_evm_address("abcdef0000000000000000000000000000000001").is_ok());
    }

    #[test]
    fn hex_prefix_skips_0x() {
        assert_eq!(hex_prefix("0xabcdef1234", 6), "abcdef");
        assert_eq!(hex_prefix("0xab", 6), "ab");
    }

    #[test]
    fn abbreviates_long_addresses() {
        assert_eq!(
            abbreviate_address("0xabcdef0000000000000000000000000000000001"),
            "0xabcd...0001"
        );
    }

    #[test]
    fn abbreviation_respects_char_boundaries() {
        assert_eq!(abbreviate_address("aéééééééééé"), "aééééé...éééé");
        assert_eq!(abbreviate_address("0xé"), "0xé");
    }
}
