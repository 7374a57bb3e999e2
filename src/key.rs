//! Key encoding and the trie alphabet
//!
//! Keys are opaque byte strings. Before a key touches a trie it is encoded
//! into symbols: byte `b` becomes `b + 2` and a reserved terminator symbol
//! is appended, so every stored key ends on an edge no input byte can
//! produce. Symbol `0` never occurs in a key; it is the "unused cell" value
//! in the check array.

/// Symbol type used on trie edges. Signed so that `base + symbol`
/// arithmetic stays in one domain with the state cells.
pub type Symbol = i32;

/// Reserved terminator symbol, appended to every encoded key.
pub const TERMINATOR: Symbol = 1;

/// Number of distinct symbols: 256 bytes plus the terminator.
pub const CHARSET_SIZE: usize = 257;

/// Largest symbol value (`MIN_SYMBOL..=MAX_SYMBOL` spans the alphabet).
pub const MAX_SYMBOL: Symbol = 257;

/// Smallest symbol value (the terminator).
pub const MIN_SYMBOL: Symbol = TERMINATOR;

/// Map an input byte into its symbol.
#[inline]
pub fn symbol_from_byte(b: u8) -> Symbol {
    b as Symbol + 2
}

/// Map a non-terminator symbol back to its byte.
#[inline]
pub fn byte_from_symbol(sym: Symbol) -> u8 {
    debug_assert!((2..=MAX_SYMBOL).contains(&sym));
    (sym - 2) as u8
}

/// Encode a byte string into symbols with the terminator appended.
pub fn encode(key: &[u8]) -> Vec<Symbol> {
    let mut syms = Vec::with_capacity(key.len() + 1);
    syms.extend(key.iter().map(|&b| symbol_from_byte(b)));
    syms.push(TERMINATOR);
    syms
}

/// Decode symbols back into bytes, stopping at the first terminator.
pub fn decode(syms: &[Symbol]) -> Vec<u8> {
    syms.iter()
        .take_while(|&&s| s != TERMINATOR)
        .map(|&s| byte_from_symbol(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_mapping_is_injective() {
        let mut seen = std::collections::HashSet::new();
        for b in 0u8..=255 {
            let sym = symbol_from_byte(b);
            assert!(sym > TERMINATOR);
            assert!(sym <= MAX_SYMBOL);
            assert!(seen.insert(sym));
            assert_eq!(byte_from_symbol(sym), b);
        }
    }

    #[test]
    fn test_encode_appends_terminator() {
        let syms = encode(b"ab");
        assert_eq!(syms, vec![b'a' as Symbol + 2, b'b' as Symbol + 2, TERMINATOR]);
        assert_eq!(encode(b""), vec![TERMINATOR]);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let mut syms = encode(b"key");
        syms.push(symbol_from_byte(b'x')); // junk past the terminator
        assert_eq!(decode(&syms), b"key");
    }
}
