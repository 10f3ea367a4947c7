//! Directory → palette color assignment.
//!
//! A tab's color is derived from an md5 hash of its resolved working
//! directory, reduced modulo the palette size, so the same directory keeps
//! the same color across cycles and across daemon restarts. md5 rather than
//! the std hasher because `DefaultHasher` is seeded per process and would
//! reshuffle every color on restart.
//!
//! Once more directories are open than the palette has entries, two of them
//! can share a slot (birthday-style). That is a documented property of
//! modulo assignment, not something the daemon compensates for.

/// Slot reserved for the empty or otherwise invalid path. A naive hash of
/// `""` would land in the normal distribution and collide with short paths
/// disproportionately often.
const EMPTY_PATH_INDEX: usize = 0;

/// Returns the palette slot for `path` given a palette of `palette_len`
/// entries. Deterministic and total: invalid input falls back to the empty
/// sentinel rather than failing.
///
/// Sentinels: the empty (or non-absolute) path maps to slot 0 and the root
/// path maps to the last slot; both are fixed and independent of the hash
/// distribution. They are distinct for any palette with at least two
/// entries.
pub fn palette_index(path: &str, palette_len: usize) -> usize {
    if palette_len == 0 {
        return 0;
    }
    if path.is_empty() || !path.starts_with('/') {
        return EMPTY_PATH_INDEX;
    }
    if path == "/" {
        return palette_len - 1;
    }

    let digest = md5::compute(path.as_bytes());
    let value = u128::from_be_bytes(digest.0);
    (value % palette_len as u128) as usize
}

/// Convenience wrapper returning the palette entry itself.
pub fn color_for_path<'a>(path: &str, palette: &'a [String]) -> &'a str {
    &palette[palette_index(path, palette.len())]
}
