// addr: Packs ip4.addr and ip6.addr lists into arrays of struct in_addr and
//       struct in6_addr.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::codec::Encoded;
use crate::errors::JailError;
use libc::{
    in6_addr,
    in_addr,
};
use std::mem::size_of;
use std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};
use tracing::trace;

/// Size of one `struct in_addr`.
pub const IN_ADDR_SIZE: usize = size_of::<in_addr>();

/// Size of one `struct in6_addr`.
pub const IN6_ADDR_SIZE: usize = size_of::<in6_addr>();

/// Address family of an address list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// IPv4, packed as `struct in_addr`
    Inet,
    /// IPv6, packed as `struct in6_addr`
    Inet6,
}

impl Family {
    /// Size of one packed address of this family.
    pub fn element_size(self) -> usize {
        match self {
            Self::Inet  => IN_ADDR_SIZE,
            Self::Inet6 => IN6_ADDR_SIZE,
        }
    }

    /// Returns the family with the given packed element size.
    pub fn from_element_size(size: usize) -> Option<Self> {
        match size {
            IN_ADDR_SIZE  => Some(Self::Inet),
            IN6_ADDR_SIZE => Some(Self::Inet6),
            _             => None,
        }
    }

    fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

/// Returns the family shared by every address in the list, `None` for an
/// empty list.
pub fn family(addrs: &[IpAddr]) -> Result<Option<Family>, JailError> {
    let mut family = None;

    for addr in addrs {
        let this = Family::of(addr);

        match family {
            None                   => family = Some(this),
            Some(f) if f == this   => {},
            Some(_)                => return Err(JailError::MixedFamily),
        }
    }

    Ok(family)
}

/// Encodes an address list.
///
/// Both address types are stored in network byte order, which is exactly
/// the in-memory layout of `in_addr.s_addr` and `in6_addr.s6_addr`, so the
/// octets are copied as they are.
pub fn encode(addrs: &[IpAddr], max_count: usize) -> Result<Encoded, JailError> {
    trace!("addr::encode: {} addresses, max {}", addrs.len(), max_count);

    if addrs.is_empty() {
        return Ok(Encoded::absent());
    }

    // A mixed list is wrong whatever its length, so it is rejected first.
    let family = family(addrs)?;

    if addrs.len() > max_count {
        return Err(JailError::TooManyAddresses {
            count: addrs.len(),
            max_count,
        });
    }

    let size = family.map_or(0, Family::element_size);

    let mut buf = Vec::with_capacity(addrs.len() * size);

    for addr in addrs {
        match addr {
            IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => buf.extend_from_slice(&v6.octets()),
        }
    }

    Ok(Encoded::from_vec(buf))
}

/// Decodes a packed array of the given family, as returned by jail_get(2).
/// Trailing bytes that do not make up a whole address are ignored.
pub fn decode(bytes: &[u8], family: Family) -> Vec<IpAddr> {
    let chunks = bytes.chunks_exact(family.element_size());

    match family {
        Family::Inet => {
            chunks
                .filter_map(|c| <[u8; IN_ADDR_SIZE]>::try_from(c).ok())
                .map(|octets| IpAddr::V4(Ipv4Addr::from(octets)))
                .collect()
        },
        Family::Inet6 => {
            chunks
                .filter_map(|c| <[u8; IN6_ADDR_SIZE]>::try_from(c).ok())
                .map(|octets| IpAddr::V6(Ipv6Addr::from(octets)))
                .collect()
        },
    }
}
