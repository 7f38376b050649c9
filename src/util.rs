use std::ffi::CStr;
use libc::{__errno_location, strerror};

/// The calling thread's errno.
pub fn error() -> i32 {
    unsafe { *__errno_location() }
}

/// strerror(errno) as an owned string, for error formatting.
pub fn error_str() -> String {
    unsafe { CStr::from_ptr(strerror(error())).to_string_lossy().into_owned() }
}
