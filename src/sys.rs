// sys: The jail_set(2), jail_get(2) and jail_remove(2) system calls.
#![deny(missing_docs)]
use crate::frame::Iovecs;
use bitflags::bitflags;

bitflags! {
    /// Flags accepted by jail_set(2) and jail_get(2).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct JailFlags: i32 {
        /// Create a new jail.
        const CREATE = 0x01;
        /// Modify an existing jail.
        const UPDATE = 0x02;
        /// Attach the calling process to the jail.
        const ATTACH = 0x04;
        /// Allow operating on jails that are being removed.
        const DYING  = 0x08;
    }
}

/// The jail system calls.
///
/// Each call receives the iovecs of a freshly built call frame and returns
/// the raw status: a jail ID on success, or a negative value on failure.
/// Implement this to call the kernel some other way, or to script
/// responses in tests.
pub trait JailSys {
    /// Calls jail_set(2).
    fn set(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32;

    /// Calls jail_get(2).
    fn get(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32;

    /// Calls jail_remove(2).
    fn remove(&self, jid: i32) -> i32;

    /// The error behind the last failed call.
    fn last_os_error(&self) -> std::io::Error {
        std::io::Error::last_os_error()
    }
}

impl<S: JailSys + ?Sized> JailSys for &S {
    fn set(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32 {
        (**self).set(iov, flags)
    }

    fn get(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32 {
        (**self).get(iov, flags)
    }

    fn remove(&self, jid: i32) -> i32 {
        (**self).remove(jid)
    }

    fn last_os_error(&self) -> std::io::Error {
        (**self).last_os_error()
    }
}

/// The running FreeBSD kernel.
#[cfg(target_os = "freebsd")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Kernel;

// Contains unsafe code.
#[cfg(target_os = "freebsd")]
impl JailSys for Kernel {
    fn set(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32 {
        let (ptr, len) = iov.as_raw_parts();

        // The iovecs point into buffers owned by the frame that `iov`
        // borrows, so they outlive the call.
        unsafe { libc::jail_set(ptr, len, flags.bits()) }
    }

    fn get(&self, iov: &mut Iovecs<'_>, flags: JailFlags) -> i32 {
        let (ptr, len) = iov.as_raw_parts();

        // As above. The kernel writes no further than each iov_len.
        unsafe { libc::jail_get(ptr, len, flags.bits()) }
    }

    fn remove(&self, jid: i32) -> i32 {
        unsafe { libc::jail_remove(jid) }
    }
}
