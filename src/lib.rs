//! jiov library
//!
//! This lib marshals FreeBSD jail parameters into the iovec arrays taken by
//! jail_set(2) and jail_get(2), and decodes what the kernel writes back.
//!
//! Parameter types come from the kernel's `security.jail.param` sysctl tree
//! through a [`ParamOracle`], fronted by a shared [`ParamCache`]. Values are
//! collected in a [`ParamTable`], laid out for one kernel call by a
//! [`CallFrame`], and handed over through [`JailSys`]. [`Directory`] bundles
//! the common operations.
//!
//! ```no_run
//! # #[cfg(target_os = "freebsd")]
//! # fn main() -> Result<(), jiov::JailError> {
//! use jiov::{
//!     Directory,
//!     Kernel,
//!     LogicalValue,
//!     ParamCache,
//!     SysctlOracle,
//! };
//!
//! let params = ParamCache::new(SysctlOracle::new())?;
//! let jails = Directory::new(Kernel, &params);
//!
//! let table = jails.table()
//!     .with("name", "rescue")?
//!     .with("path", "/rescue")?
//!     .with("persist", LogicalValue::Absent)?;
//!
//! let jid = jails.create(table)?;
//! println!("created jail {jid}");
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "freebsd"))]
//! # fn main() {}
//! ```
#![deny(missing_docs)]
/// Address list packing for ip4.addr and ip6.addr.
pub mod addr;
/// Scalar value encoding and decoding.
pub mod codec;
#[cfg(feature = "config")]
mod config;
mod directory;
mod errors;
mod frame;
mod oracle;
mod sys;
mod table;
mod value;

pub use addr::Family;
#[cfg(feature = "config")]
pub use config::ParamSet;
pub use directory::{
    Directory,
    JailEntry,
    Jails,
};
pub use errors::JailError;
pub use frame::{
    CallFrame,
    Iovecs,
    ERRMSG_LEN,
};
#[cfg(target_os = "freebsd")]
pub use oracle::SysctlOracle;
pub use oracle::{
    ParamCache,
    ParamKind,
    ParamOracle,
    StaticOracle,
    TypeLimit,
    DEFAULT_MAX_AF_IPS,
};
#[cfg(target_os = "freebsd")]
pub use sys::Kernel;
pub use sys::{
    JailFlags,
    JailSys,
};
pub use table::{
    ParamMap,
    ParamTable,
};
pub use value::{
    LogicalValue,
    ParamName,
};

// Sends tracing output from the library to the test harness.
#[cfg(test)]
pub(crate) fn test_log() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
