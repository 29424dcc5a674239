//! Wallet address format checks
//!
//! The ledger service is the real authority on addresses; this module only
//! rejects strings that cannot possibly be one before any registry lookup
//! happens.

/// Base58 alphabet (no 0, O, I, l).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub const MAX_WALLET_LEN: usize = 50;

/// Structural address check: non-empty, bounded length, base58 charset.
pub fn is_valid_wallet(address: &str) -> bool {
    if address.is_empty() || address.len() > MAX_WALLET_LEN {
        return false;
    }
    address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_base58_addresses() {
        assert!(is_valid_wallet("Addr1"));
        assert!(is_valid_wallet("4Nd1mYvturBY4vkTXGuAAJXFkGmVMB8bVoMWrUuHyLL8"));
    }

    #[test]
    fn rejects_ambiguous_and_non_base58_characters() {
        assert!(!is_valid_wallet("wa11et-0"));  // '-' and '0'
        assert!(!is_valid_wallet("Oops"));      // 'O'
        assert!(!is_valid_wallet("Illegal"));   // 'I' and 'l'
        assert!(!is_valid_wallet("addr with space"));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(!is_valid_wallet(""));
        assert!(!is_valid_wallet(&"A".repeat(MAX_WALLET_LEN + 1)));
        assert!(is_valid_wallet(&"A".repeat(MAX_WALLET_LEN)));
    }
}
