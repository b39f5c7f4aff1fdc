// errors: Errors returned while marshalling jail parameters and calling into
//         the kernel.
#![forbid(unsafe_code)]
#![forbid(missing_docs)]
use thiserror::Error;

/// Every error this crate can return. None of them are fatal; all are
/// reported back to the caller.
#[derive(Debug, Error)]
pub enum JailError {
    /// Returned when a value of the wrong shape is given for a parameter, or
    /// a parameter name is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Returned when an integer does not fit in a native C int.
    #[error("integer {0} out of range for a jail parameter")]
    Range(i64),

    /// Returned when a string is longer than the kernel allows for the
    /// parameter.
    #[error("value for {name} is {length} bytes, maximum is {max_length}")]
    ValueTooLong {
        /// Parameter name
        name: String,
        /// Length of the rejected value, without its NUL terminator
        length: usize,
        /// Maximum length reported by the kernel
        max_length: usize,
    },

    /// Returned when an address list is longer than jail_max_af_ips.
    #[error("{count} addresses given, maximum is {max_count}")]
    TooManyAddresses {
        /// Number of addresses given
        count: usize,
        /// Maximum number of addresses per family
        max_count: usize,
    },

    /// Returned when an address list mixes IPv4 and IPv6 addresses.
    #[error("address list mixes IPv4 and IPv6 addresses")]
    MixedFamily,

    /// Returned when the kernel has no jail parameter with the given name.
    #[error("unknown jail parameter: {0}")]
    UnknownParameter(String),

    /// Returned when jail_set, jail_get or jail_remove fails.
    #[error("jail call failed ({code}): {message}")]
    KernelCall {
        /// Raw status returned by the kernel call
        code: i32,
        /// Decoded errmsg, or the OS error when the kernel left it empty
        message: String,
    },

    /// Returned when sysctl fails for a reason other than a missing
    /// parameter.
    #[error("sysctl error: {0}")]
    Sysctl(String),

    /// Returned when a parameter set file cannot be read.
    #[error("failed to read parameter set: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a parameter set file cannot be parsed.
    #[cfg(feature = "config")]
    #[error("failed to parse parameter set: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
