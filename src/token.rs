/// Default length of session ids, state fingerprints and group ids.
pub const DEFAULT_TOKEN_LEN: usize = 12;

/// Random ASCII alphanumeric token of `len` characters.
pub fn random_token(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(len)
        .collect()
}
