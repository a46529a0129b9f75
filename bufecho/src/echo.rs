//! The buffer echo operation over plain byte slices
//!
//! The caller hands in a buffer it owns. The first [MARKER_LEN] bytes of it are overwritten with
//! [MARKER_BYTE], and a freshly allocated buffer of [OUTPUT_LEN] bytes, each set to [FILL_BYTE], is
//! handed back.

use alloc::vec;
use alloc::vec::Vec;

use crate::BufEchoError;

/// Value written into the head of the caller's buffer
pub const MARKER_BYTE: u8 = 70;

/// Number of leading bytes of the caller's buffer that get overwritten
pub const MARKER_LEN: usize = 2;

/// Length of every returned buffer
pub const OUTPUT_LEN: usize = 5;

/// Value every byte of a returned buffer is set to
pub const FILL_BYTE: u8 = 75;

/// Mark `buf` and return a new buffer owned by the caller
///
/// Fails with [BufEchoError::BufferTooSmall] without touching `buf` if it is shorter than
/// [MARKER_LEN].
pub fn hello(buf: &mut [u8]) -> Result<Vec<u8>, BufEchoError> {
    check_input(buf)?;

    mark(buf);
    let out = vec![FILL_BYTE; OUTPUT_LEN];
    trace!("marked {} byte buffer, returning {out:?}", buf.len());
    Ok(out)
}

/// Like [hello], but the returned buffer is placed in `out`
///
/// This is for hosts that cannot hand a Rust allocation to their caller and have to provide the
/// destination themselves. `out` must be exactly [OUTPUT_LEN] bytes long. Both lengths are checked
/// before either slice is written to.
pub fn hello_into(buf: &mut [u8], out: &mut [u8]) -> Result<(), BufEchoError> {
    check_input(buf)?;
    if out.len() != OUTPUT_LEN {
        error!("output buffer has {} bytes instead of {OUTPUT_LEN}", out.len());
        return Err(BufEchoError::OutputSizeMismatch {
            expected: OUTPUT_LEN,
            got: out.len(),
        });
    }

    mark(buf);
    out.fill(FILL_BYTE);
    Ok(())
}

fn check_input(buf: &[u8]) -> Result<(), BufEchoError> {
    if buf.len() < MARKER_LEN {
        error!(
            "input buffer has {} bytes, need at least {MARKER_LEN}",
            buf.len()
        );
        return Err(BufEchoError::BufferTooSmall {
            expected: MARKER_LEN,
            got: buf.len(),
        });
    }
    Ok(())
}

fn mark(buf: &mut [u8]) {
    buf[..MARKER_LEN].fill(MARKER_BYTE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_head_and_returns_fill() {
        let mut buf = [1, 2, 3, 4];
        let out = hello(&mut buf).unwrap();

        assert_eq!(buf, [70, 70, 3, 4]);
        assert_eq!(out, [75, 75, 75, 75, 75]);
    }

    #[test]
    fn exactly_two_bytes() {
        let mut buf = [0u8; 2];
        let out = hello(&mut buf).unwrap();

        assert_eq!(buf, [MARKER_BYTE; 2]);
        assert_eq!(out.len(), OUTPUT_LEN);
    }

    #[test]
    fn tail_is_left_alone() {
        let mut buf: Vec<u8> = (0..=255).collect();
        hello(&mut buf).unwrap();

        assert_eq!(&buf[..2], &[MARKER_BYTE, MARKER_BYTE]);
        assert!(buf[2..].iter().copied().eq(2..=255));
    }

    #[test]
    fn short_buffers_are_rejected_untouched() {
        let mut empty: [u8; 0] = [];
        assert_eq!(
            hello(&mut empty),
            Err(BufEchoError::BufferTooSmall {
                expected: 2,
                got: 0
            })
        );

        let mut one = [9u8];
        assert_eq!(
            hello(&mut one),
            Err(BufEchoError::BufferTooSmall {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(one, [9]);
    }

    #[test]
    fn every_call_allocates_anew() {
        let mut buf = [0u8; 3];
        let mut first = hello(&mut buf).unwrap();
        let second = hello(&mut buf).unwrap();

        assert_ne!(first.as_ptr(), second.as_ptr());
        first[0] = 0;
        assert_eq!(second, [FILL_BYTE; OUTPUT_LEN]);
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let mut buf = [5u8, 6, 7];
        for _ in 0..10 {
            assert_eq!(hello(&mut buf).unwrap(), [FILL_BYTE; OUTPUT_LEN]);
            assert_eq!(buf, [70, 70, 7]);
        }
    }

    #[test]
    fn into_checks_both_lengths_before_writing() {
        let mut buf = [1u8, 2, 3];
        let mut out = [0u8; 4];
        assert_eq!(
            hello_into(&mut buf, &mut out),
            Err(BufEchoError::OutputSizeMismatch {
                expected: 5,
                got: 4
            })
        );
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(out, [0; 4]);

        let mut short = [1u8];
        let mut out = [0u8; OUTPUT_LEN];
        assert!(hello_into(&mut short, &mut out).is_err());
        assert_eq!(out, [0; OUTPUT_LEN]);
    }

    #[test]
    fn into_fills_destination() {
        let mut buf = [1u8, 2];
        let mut out = [0u8; OUTPUT_LEN];
        hello_into(&mut buf, &mut out).unwrap();

        assert_eq!(buf, [70, 70]);
        assert_eq!(out, [75; 5]);
    }
}
