//! Little-endian integer and space-padded ASCII writers into byte slices.
//!
//! These are the only two primitives the rest of the crate uses to lay
//! bytes into a directory record, a boot sector, or a FAT entry. Nothing
//! here knows about the FAT format; it just writes fixed-width fields.

/// Writes `value` little-endian into `dst`, one byte per slot.
///
/// `dst.len()` determines the field width (1, 2, 4, or 8 bytes are all the
/// widths this crate uses). Bits of `value` beyond `8 * dst.len()` would be
/// silently truncated; that should never happen for a value this crate
/// computed itself, so it is only checked in debug builds.
pub fn write_uint(dst: &mut [u8], value: u64) {
    debug_assert!(
        dst.len() >= 8 || value < (1u64 << (8 * dst.len())),
        "value {value:#x} does not fit in {} byte(s)",
        dst.len()
    );
    for (i, slot) in dst.iter_mut().enumerate() {
        *slot = (value >> (8 * i)) as u8;
    }
}

/// Writes the minimum of `dst.len()` and `s.len()` bytes of `s` into the
/// prefix of `dst`; if `s` is shorter, pads the remainder with ASCII space.
/// No null terminator is written.
pub fn write_string(dst: &mut [u8], s: &[u8]) {
    let n = dst.len().min(s.len());
    dst[..n].copy_from_slice(&s[..n]);
    for slot in &mut dst[n..] {
        *slot = b' ';
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_uint_little_endian() {
        let mut buf = [0u8; 4];
        write_uint(&mut buf, 0x1234_5678);
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn write_uint_narrow_field() {
        let mut buf = [0u8; 2];
        write_uint(&mut buf, 0xBEEF);
        assert_eq!(buf, [0xEF, 0xBE]);
    }

    #[test]
    fn write_string_pads_with_space() {
        let mut buf = [0u8; 8];
        write_string(&mut buf, b"HI");
        assert_eq!(&buf, b"HI      ");
    }

    #[test]
    fn write_string_truncates() {
        let mut buf = [0u8; 3];
        write_string(&mut buf, b"ABCDEF");
        assert_eq!(&buf, b"ABC");
    }
}
