//! Short (8.3) name policy: validity checks, unique alias generation, and
//! the LFN checksum.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Punctuation bytes allowed in an 8.3 name in addition to `0-9`, `A-Z`
/// and `a-z`.
const ALLOWED_PUNCTUATION: &[u8] = b"!#$%&'()-@^_`{}~";

/// True if `b` (already considered case-insensitively) may appear in an
/// 8.3 name.
fn is_allowed_short_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(&b)
}

/// Splits `name` at its first `.`, returning `(stem, extension)` with the
/// dot itself excluded from both halves. `extension` is `None` if there is
/// no dot.
fn split_stem_ext(name: &str) -> (&str, Option<&str>) {
    match name.find('.') {
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
        None => (name, None),
    }
}

fn is_mixed_case(s: &str) -> bool {
    let mut has_upper = false;
    let mut has_lower = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_lowercase() {
            has_lower = true;
        }
    }
    has_upper && has_lower
}

fn chars_all_allowed(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii() && is_allowed_short_byte(c as u8))
}

/// Returns true iff `name` is already a valid 8.3 short name: no dot with
/// length 1..=8, or exactly one dot with stem length 1..=8 and extension
/// length 1..=3, both drawn from the allowed character set and not mixed
/// case.
pub fn is_short_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 12 {
        return false;
    }
    let (stem, ext) = split_stem_ext(name);
    match ext {
        None => {
            (1..=8).contains(&stem.chars().count())
                && chars_all_allowed(stem)
                && !is_mixed_case(stem)
        }
        Some(ext) => {
            if name.matches('.').count() != 1 {
                return false;
            }
            (1..=8).contains(&stem.chars().count())
                && (1..=3).contains(&ext.chars().count())
                && chars_all_allowed(stem)
                && chars_all_allowed(ext)
                && !is_mixed_case(stem)
                && !is_mixed_case(ext)
        }
    }
}

/// Normalizes an already-short name into its 11-byte, space-padded,
/// uppercase on-disk form. Only valid to call when [`is_short_name`] holds.
pub fn normalize_short_name(name: &str) -> [u8; 11] {
    let (stem, ext) = split_stem_ext(name);
    pack_stem_ext(stem, ext.unwrap_or(""))
}

/// Whether the original stem / extension (as typed by the user) contained
/// any lowercase ASCII letters, for the NT case-preservation byte.
pub fn lowercase_flags(name: &str) -> (bool, bool) {
    let (stem, ext) = split_stem_ext(name);
    (
        stem.chars().any(|c| c.is_ascii_lowercase()),
        ext.map(|e| e.chars().any(|c| c.is_ascii_lowercase()))
            .unwrap_or(false),
    )
}

fn map_short_char(c: char) -> u8 {
    if c.is_ascii() {
        let b = c as u8;
        if b.is_ascii_lowercase() {
            b.to_ascii_uppercase()
        } else if is_allowed_short_byte(b) {
            b
        } else {
            b'_'
        }
    } else {
        b'_'
    }
}

fn pack_stem_ext(stem: &str, ext: &str) -> [u8; 11] {
    let mut buf = [b' '; 11];
    for (i, c) in stem.chars().take(8).enumerate() {
        buf[i] = map_short_char(c);
    }
    for (i, c) in ext.chars().take(3).enumerate() {
        buf[8 + i] = map_short_char(c);
    }
    buf
}

/// Maps the characters of one stem/extension segment into short-name
/// bytes, keeping at most `limit` of them. Spaces carry no information in
/// an 8.3 name (they are illegal and never abbreviated to `_`, unlike
/// every other illegal byte) so they are elided rather than substituted.
fn collect_alias_chars(s: &str, limit: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s
        .chars()
        .filter(|&c| c != ' ')
        .map(map_short_char)
        .collect();
    out.truncate(limit);
    out
}

/// Builds a unique 8.3 alias for `long_name`, inserting the chosen alias
/// into `taken` so subsequent calls avoid it.
pub fn make_short_alias(long_name: &str, taken: &mut HashSet<[u8; 11]>) -> Result<[u8; 11]> {
    let (stem_src, ext_src) = split_stem_ext(long_name);

    let stem = collect_alias_chars(stem_src, 8);
    let ext = collect_alias_chars(ext_src.unwrap_or(""), 3);

    for i in 1..=9_999_999u32 {
        let suffix = format!("~{i}");
        let mut candidate_stem = stem.clone();
        if candidate_stem.len() + suffix.len() > 8 {
            candidate_stem.truncate(8 - suffix.len());
        }
        candidate_stem.extend_from_slice(suffix.as_bytes());

        let mut buf = [b' '; 11];
        let stem_len = candidate_stem.len().min(8);
        buf[..stem_len].copy_from_slice(&candidate_stem[..stem_len]);
        let ext_len = ext.len().min(3);
        buf[8..8 + ext_len].copy_from_slice(&ext[..ext_len]);

        if !taken.contains(&buf) {
            taken.insert(buf);
            return Ok(buf);
        }
    }

    Err(Error::bad_input(
        long_name,
        "cannot generate unique short name",
    ))
}

/// Computes the LFN checksum over an already-normalized 11-byte 8.3 name.
pub fn short_name_checksum(short_name: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in short_name {
        sum = ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b);
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_plain_short_names() {
        assert!(is_short_name("HELLO"));
        assert!(is_short_name("HELLO.TXT"));
        assert!(is_short_name("A"));
        assert!(is_short_name("A.B"));
        assert!(!is_short_name(""));
        assert!(!is_short_name("TOOLONGNAME"));
        assert!(!is_short_name("HELLO.TOOLONG"));
        assert!(!is_short_name("HELLO.TXT.GZ"));
        assert!(!is_short_name("Hello"));
        assert!(!is_short_name("my long report.txt"));
    }

    #[test]
    fn allows_differing_case_between_stem_and_extension() {
        assert!(is_short_name("hello.TXT"));
        assert!(is_short_name("README.doc"));
        assert!(!is_short_name("HeLLo.TXT"));
        assert!(!is_short_name("README.Doc"));
    }

    #[test]
    fn rejects_excluded_characters() {
        assert!(!is_short_name("A B"));
        assert!(!is_short_name("A*B"));
    }

    #[test]
    fn alias_generation_basic() {
        let mut taken = HashSet::new();
        let alias = make_short_alias("my long report.txt", &mut taken).unwrap();
        assert_eq!(&alias, b"MYLONG~1TXT");
    }

    #[test]
    fn alias_collision_increments_suffix() {
        let mut taken = HashSet::new();
        let a1 = make_short_alias("report one.txt", &mut taken).unwrap();
        let a2 = make_short_alias("report two.txt", &mut taken).unwrap();
        assert_eq!(&a1, b"REPORT~1TXT");
        assert_eq!(&a2, b"REPORT~2TXT");
        assert_ne!(a1, a2);
    }

    #[test]
    fn checksum_is_stable_on_renormalize() {
        let name = "HELLO   TXT";
        let mut buf = [b' '; 11];
        buf.copy_from_slice(name.as_bytes());
        let sum1 = short_name_checksum(&buf);
        let sum2 = short_name_checksum(&buf);
        assert_eq!(sum1, sum2);
    }

    #[test]
    fn checksum_matches_generated_alias() {
        let mut taken = HashSet::new();
        let alias = make_short_alias("my long report.txt", &mut taken).unwrap();
        // re-deriving the checksum from the same bytes is deterministic
        let checksum_a = short_name_checksum(&alias);
        let checksum_b = short_name_checksum(&alias);
        assert_eq!(checksum_a, checksum_b);
    }
}
