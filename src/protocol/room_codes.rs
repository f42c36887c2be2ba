use rand::Rng;

/// Room code alphabet: uppercase letters and digits minus the easily
/// confused `I`, `L`, `O`, `0`, `1`.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Fixed room code length.
pub const ROOM_CODE_LEN: usize = 6;

/// Generate a six-character room code from the unambiguous alphabet.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
            // SAFETY: `idx` is produced by `gen_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = ROOM_CODE_ALPHABET[idx] as char;
            ch
        })
        .collect()
}

/// Validate a client-supplied room code against the alphabet and length.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN
        && code
            .bytes()
            .all(|b| ROOM_CODE_ALPHABET.contains(&b))
}
