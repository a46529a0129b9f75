//! C ABI for linking against the `cdylib`
//!
//! Errors are reported as status codes, never by unwinding across the boundary. Buffers returned by
//! [bufecho_hello] belong to the caller and must be given back through [bufecho_buffer_free].

use core::ptr;

use crate::{echo, BufEchoError};

pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARGUMENT_COUNT: i32 = -1;
pub const STATUS_INVALID_ARGUMENT_TYPE: i32 = -2;
pub const STATUS_BUFFER_TOO_SMALL: i32 = -3;
pub const STATUS_INTERNAL: i32 = -4;

/// A buffer allocated by this library
#[repr(C)]
#[derive(Debug)]
pub struct OwnedBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl OwnedBuffer {
    pub const fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let len = buf.len();
        let data = Box::into_raw(buf.into_boxed_slice()) as *mut u8;
        Self { data, len }
    }
}

fn status(err: &BufEchoError) -> i32 {
    match err {
        BufEchoError::InvalidArgumentCount { .. } => STATUS_INVALID_ARGUMENT_COUNT,
        BufEchoError::InvalidArgumentType { .. } => STATUS_INVALID_ARGUMENT_TYPE,
        BufEchoError::BufferTooSmall { .. } => STATUS_BUFFER_TOO_SMALL,
        _ => STATUS_INTERNAL,
    }
}

/// Mark `len` bytes at `buf` and store a newly allocated buffer in `out`
///
/// A null `buf` counts as a missing argument. `out` is left untouched on error.
///
/// # Safety
///
/// `buf` must be null or valid for reads and writes of `len` bytes, and not be accessed by anyone
/// else for the duration of the call. `out` must be null or valid for a write of an [OwnedBuffer].
#[no_mangle]
pub unsafe extern "C" fn bufecho_hello(buf: *mut u8, len: usize, out: *mut OwnedBuffer) -> i32 {
    if buf.is_null() {
        error!("bufecho_hello called without a buffer");
        return STATUS_INVALID_ARGUMENT_COUNT;
    }
    if len < echo::MARKER_LEN {
        error!("bufecho_hello called with a buffer of {len} bytes");
        return status(&BufEchoError::BufferTooSmall {
            expected: echo::MARKER_LEN,
            got: len,
        });
    }
    if out.is_null() {
        error!("bufecho_hello called without a place to return the buffer to");
        return STATUS_INVALID_ARGUMENT_TYPE;
    }

    let input = unsafe { core::slice::from_raw_parts_mut(buf, len) };
    match echo::hello(input) {
        Ok(output) => {
            unsafe { out.write(OwnedBuffer::from_vec(output)) };
            STATUS_OK
        }
        Err(e) => status(&e),
    }
}

/// Release a buffer returned by [bufecho_hello]
///
/// # Safety
///
/// `buf` must have been produced by [bufecho_hello] and not been freed before. A null buffer is
/// ignored.
#[no_mangle]
pub unsafe extern "C" fn bufecho_buffer_free(buf: OwnedBuffer) {
    if buf.data.is_null() {
        return;
    }
    let slice = ptr::slice_from_raw_parts_mut(buf.data, buf.len);
    drop(unsafe { Box::from_raw(slice) });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_through_c_abi() {
        let mut buf = [1u8, 2, 3, 4];
        let mut out = OwnedBuffer::null();

        let status = unsafe { bufecho_hello(buf.as_mut_ptr(), buf.len(), &mut out) };

        assert_eq!(status, STATUS_OK);
        assert_eq!(buf, [70, 70, 3, 4]);
        let returned = unsafe { core::slice::from_raw_parts(out.data, out.len) };
        assert_eq!(returned, [75; 5]);
        unsafe { bufecho_buffer_free(out) };
    }

    #[test]
    fn null_buffer_is_a_missing_argument() {
        let mut out = OwnedBuffer::null();
        let status = unsafe { bufecho_hello(ptr::null_mut(), 4, &mut out) };

        assert_eq!(status, STATUS_INVALID_ARGUMENT_COUNT);
        assert!(out.data.is_null());
    }

    #[test]
    fn short_buffer() {
        let mut buf = [7u8];
        let mut out = OwnedBuffer::null();
        let status = unsafe { bufecho_hello(buf.as_mut_ptr(), buf.len(), &mut out) };

        assert_eq!(status, STATUS_BUFFER_TOO_SMALL);
        assert_eq!(buf, [7]);
        assert!(out.data.is_null());
    }

    #[test]
    fn null_out() {
        let mut buf = [1u8, 2];
        let status = unsafe { bufecho_hello(buf.as_mut_ptr(), buf.len(), ptr::null_mut()) };

        assert_eq!(status, STATUS_INVALID_ARGUMENT_TYPE);
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn length_is_checked_before_out() {
        let mut buf = [7u8];
        let status = unsafe { bufecho_hello(buf.as_mut_ptr(), buf.len(), ptr::null_mut()) };

        assert_eq!(status, STATUS_BUFFER_TOO_SMALL);
        assert_eq!(buf, [7]);
    }

    #[test]
    fn returned_buffers_are_distinct() {
        let mut buf = [0u8; 2];
        let (mut a, mut b) = (OwnedBuffer::null(), OwnedBuffer::null());
        unsafe {
            assert_eq!(bufecho_hello(buf.as_mut_ptr(), 2, &mut a), STATUS_OK);
            assert_eq!(bufecho_hello(buf.as_mut_ptr(), 2, &mut b), STATUS_OK);
        }
        assert_ne!(a.data, b.data);

        unsafe {
            *a.data = 0;
            assert_eq!(core::slice::from_raw_parts(b.data, b.len), [75; 5]);
            bufecho_buffer_free(a);
            bufecho_buffer_free(b);
        }
    }

    #[test]
    fn freeing_null_is_fine() {
        unsafe { bufecho_buffer_free(OwnedBuffer::null()) };
    }
}
