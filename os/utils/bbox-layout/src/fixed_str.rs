//! Fixed-width, NUL-terminated byte strings.

/// Copy `src` into `dst`, truncating so that at least one trailing NUL
/// remains, and zero the rest of `dst`.
pub fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    if dst.is_empty() {
        return;
    }
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

/// Force the last byte to NUL so a later C-style read cannot run off the end.
pub fn terminate(buf: &mut [u8]) {
    if let Some(last) = buf.last_mut() {
        *last = 0;
    }
}

/// Printable view of a fixed-width field.
///
/// Stops at the first NUL, never reads the final byte (treated as the
/// terminator even if corrupted), and cuts at the first invalid UTF-8
/// sequence.
#[must_use]
pub fn fixed_str(buf: &[u8]) -> &str {
    let limit = buf.len().saturating_sub(1);
    let body = &buf[..limit];
    let end = body.iter().position(|&b| b == 0).unwrap_or(limit);
    match core::str::from_utf8(&body[..end]) {
        Ok(s) => s,
        // the valid prefix always decodes
        Err(e) => core::str::from_utf8(&body[..e.valid_up_to()]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_and_terminates() {
        let mut b = [0xFFu8; 6];
        copy_truncated(&mut b, b"rdr_memory");
        assert_eq!(&b, b"rdr_m\0");

        let mut b = [0xFFu8; 6];
        copy_truncated(&mut b, b"ap");
        assert_eq!(&b, b"ap\0\0\0\0");
    }

    #[test]
    fn view_never_reads_the_last_byte() {
        assert_eq!(fixed_str(b"abcdef"), "abcde");
        assert_eq!(fixed_str(b"ab\0def"), "ab");
        assert_eq!(fixed_str(b""), "");
    }

    #[test]
    fn view_stops_at_invalid_utf8() {
        assert_eq!(fixed_str(&[b'o', b'k', 0xFF, b'x', 0]), "ok");
    }

    #[test]
    fn terminate_sets_last_byte() {
        let mut b = *b"xyz";
        terminate(&mut b);
        assert_eq!(&b, b"xy\0");
    }
}
