// value: Logical jail parameter values and parameter names.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::JailError;
use std::ffi::CString;
use std::fmt;
use std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};

/// Name of a jail parameter, such as `name`, `path` or `ip4.addr`.
///
/// Names compare and hash by their raw bytes, so a name built from a `&str`
/// is the same key as one built from the equivalent `&[u8]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamName(CString);

impl ParamName {
    /// Builds a name from raw bytes. The name must be non-empty and must not
    /// contain NUL bytes.
    pub fn new<T: Into<Vec<u8>>>(name: T) -> Result<Self, JailError> {
        let name = name.into();

        if name.is_empty() {
            let err = JailError::InvalidInput(
                "parameter name must not be empty".to_owned()
            );

            return Err(err);
        }

        match CString::new(name) {
            Ok(name) => Ok(Self(name)),
            Err(err) => {
                let msg = format!(
                    "parameter name contains a NUL byte at {}",
                    err.nul_position(),
                );

                Err(JailError::InvalidInput(msg))
            },
        }
    }

    /// The name without its NUL terminator.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The name as handed to the kernel, including its NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        self.0.as_bytes_with_nul()
    }

    /// Boolean parameters can be negated by prefixing the last component of
    /// their name with `no`. Returns the base parameter for such a name.
    pub fn without_no_prefix(&self) -> Option<Self> {
        let name = self.as_bytes();

        let split = name.iter()
            .rposition(|&b| b == b'.')
            .map_or(0, |dot| dot + 1);

        let (parent, last) = name.split_at(split);
        let base = last.strip_prefix(b"no")?;

        if base.is_empty() {
            return None;
        }

        let mut stripped = parent.to_vec();
        stripped.extend_from_slice(base);

        Self::new(stripped).ok()
    }
}

impl AsRef<[u8]> for ParamName {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl TryFrom<&str> for ParamName {
    type Error = JailError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<String> for ParamName {
    type Error = JailError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<&[u8]> for ParamName {
    type Error = JailError;

    fn try_from(name: &[u8]) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<Vec<u8>> for ParamName {
    type Error = JailError;

    fn try_from(name: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<&ParamName> for ParamName {
    type Error = JailError;

    fn try_from(name: &ParamName) -> Result<Self, Self::Error> {
        Ok(name.clone())
    }
}

/// A jail parameter value before it is encoded for the kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogicalValue {
    /// No value. Used for boolean parameters such as `persist` and for
    /// clearing a parameter.
    #[default]
    Absent,

    /// A C int. Kept wider than i32 so that out of range values can be
    /// rejected when they are encoded.
    Integer(i64),

    /// Raw bytes, NUL-terminated on encoding.
    ByteString(Vec<u8>),

    /// UTF-8 text, encoded as its bytes.
    Text(String),

    /// IPv4 or IPv6 addresses, never both.
    AddressList(Vec<IpAddr>),
}

impl LogicalValue {
    /// A short description of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent         => "absent",
            Self::Integer(_)     => "integer",
            Self::ByteString(_)  => "byte string",
            Self::Text(_)        => "text",
            Self::AddressList(_) => "address list",
        }
    }

    /// Returns true for `Absent` and for an empty address list, which both
    /// encode to a zero length descriptor.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Absent                => true,
            Self::AddressList(addrs)    => addrs.is_empty(),
            _                           => false,
        }
    }
}

impl From<i32> for LogicalValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for LogicalValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for LogicalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for LogicalValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&[u8]> for LogicalValue {
    fn from(value: &[u8]) -> Self {
        Self::ByteString(value.to_vec())
    }
}

impl From<Vec<u8>> for LogicalValue {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteString(value)
    }
}

impl From<Vec<IpAddr>> for LogicalValue {
    fn from(value: Vec<IpAddr>) -> Self {
        Self::AddressList(value)
    }
}

impl From<Vec<Ipv4Addr>> for LogicalValue {
    fn from(value: Vec<Ipv4Addr>) -> Self {
        Self::AddressList(value.into_iter().map(IpAddr::V4).collect())
    }
}

impl From<Vec<Ipv6Addr>> for LogicalValue {
    fn from(value: Vec<Ipv6Addr>) -> Self {
        Self::AddressList(value.into_iter().map(IpAddr::V6).collect())
    }
}

impl<T: Into<LogicalValue>> From<Option<T>> for LogicalValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}
