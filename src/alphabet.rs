//! The fixed bucket alphabet and username router.
//!
//! Every username is routed to exactly one of [`BUCKET_COUNT`] output
//! partitions by its first character: digits and lowercase letters map to
//! their position in [`ALPHABET`], everything else lands in the trailing
//! catch-all bucket. The mapping is a pure total function, stable across
//! runs, so bucket stores can be rebuilt reproducibly.

/// Bucket alphabet: one bucket per digit and lowercase letter, plus a
/// catch-all (`_`) for everything else.
pub const ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz_";

/// Number of output buckets.
pub const BUCKET_COUNT: usize = 37;

/// Index of the catch-all bucket.
pub const CATCH_ALL: usize = BUCKET_COUNT - 1;

/// Route a username to its bucket index in `[0, BUCKET_COUNT)`.
///
/// The username is trimmed and its first character lowercased before lookup.
/// Empty usernames and first characters outside the alphabet route to the
/// catch-all bucket.
#[must_use]
pub fn bucket_for(username: &str) -> usize {
    let Some(first) = username.trim().chars().next() else {
        return CATCH_ALL;
    };
    ALPHABET
        .find(first.to_ascii_lowercase())
        .unwrap_or(CATCH_ALL)
}

/// The character labelling bucket `index`.
///
/// # Panics
///
/// Panics if `index` is out of range; callers only hold indexes produced by
/// [`bucket_for`] or the fixed `0..BUCKET_COUNT` arena.
#[must_use]
pub fn bucket_char(index: usize) -> char {
    ALPHABET
        .as_bytes()
        .get(index)
        .map(|b| *b as char)
        .expect("bucket index out of range")
}
