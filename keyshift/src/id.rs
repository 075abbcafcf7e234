use nanoid::nanoid;

/// Alphabet for pass identifiers (no ambiguous glyphs).
const PASS_ID_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
const PASS_ID_LENGTH: usize = 12;

/// Generates an identifier for one runner pass, recorded in ledger history.
pub fn generate_pass_id() -> String {
    nanoid!(PASS_ID_LENGTH, PASS_ID_ALPHABET)
}
