// codec: Encodes single logical values into the buffers that jail_set(2) and
//        jail_get(2) read from and write to.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::JailError;
use crate::value::LogicalValue;
use libc::{
    c_int,
    c_void,
    iovec,
};
use std::mem::size_of;
use std::ptr;
use tracing::trace;

// Size of a native C int, as the kernel expects for integer parameters.
pub(crate) const INT_SIZE: usize = size_of::<c_int>();

/// Owned backing storage for one iovec value.
///
/// The buffer lives on the heap, so the pointer handed to the kernel stays
/// valid for as long as the `Encoded` does, even if the `Encoded` itself is
/// moved. `Absent` values have no storage at all and are passed to the
/// kernel as a null pointer with a zero length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Encoded {
    buf: Option<Vec<u8>>,
}

impl Encoded {
    /// The zero length encoding used for `Absent` and empty address lists.
    pub fn absent() -> Self {
        Self::default()
    }

    pub(crate) fn from_vec(buf: Vec<u8>) -> Self {
        Self {
            buf: Some(buf),
        }
    }

    /// Number of bytes the kernel will see for this value.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    /// True for the null descriptor.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when this encoding is the null pointer used for `Absent`.
    pub fn is_null(&self) -> bool {
        self.buf.is_none()
    }

    /// The encoded bytes, empty for `Absent`.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }

    // The kernel may write into value buffers during jail_get, so they are
    // always handed over as mutable.
    pub(crate) fn iovec(&mut self) -> iovec {
        match self.buf.as_mut() {
            None      => null_iovec(),
            Some(buf) => iovec {
                iov_base: buf.as_mut_ptr().cast::<c_void>(),
                iov_len:  buf.len(),
            },
        }
    }
}

fn null_iovec() -> iovec {
    iovec {
        iov_base: ptr::null_mut(),
        iov_len:  0,
    }
}

/// Encodes a scalar value.
///
/// Address lists carry a kernel limit and are encoded by
/// [`crate::addr::encode`] instead.
pub fn encode(value: &LogicalValue) -> Result<Encoded, JailError> {
    trace!("encode: {}", value.kind());

    match value {
        LogicalValue::Absent          => Ok(Encoded::absent()),
        LogicalValue::Integer(n)      => encode_integer(*n),
        LogicalValue::ByteString(b)   => Ok(encode_bytes(b)),
        LogicalValue::Text(s)         => Ok(encode_bytes(s.as_bytes())),
        LogicalValue::AddressList(_)  => {
            Err(JailError::InvalidInput(
                "address lists need a limit and cannot be encoded as \
                 a scalar".to_owned()
            ))
        },
    }
}

/// Encodes an integer as a native C int.
pub fn encode_integer(n: i64) -> Result<Encoded, JailError> {
    let n = c_int::try_from(n).map_err(|_| JailError::Range(n))?;

    Ok(Encoded::from_vec(n.to_ne_bytes().to_vec()))
}

/// Encodes bytes as a C string. A NUL terminator is appended unless the
/// input already ends in one.
pub fn encode_bytes(bytes: &[u8]) -> Encoded {
    let mut buf = bytes.to_vec();

    if buf.last() != Some(&0) {
        buf.push(0);
    }

    Encoded::from_vec(buf)
}

/// Decodes a native C int written by the kernel.
pub fn decode_integer(bytes: &[u8]) -> Result<i32, JailError> {
    let raw: [u8; INT_SIZE] = bytes.try_into().map_err(|_| {
        let msg = format!(
            "integer values are {INT_SIZE} bytes, got {}",
            bytes.len(),
        );

        JailError::InvalidInput(msg)
    })?;

    Ok(c_int::from_ne_bytes(raw))
}

/// Decodes a C string produced by [`encode_bytes`], dropping its single NUL
/// terminator.
pub fn decode_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.strip_suffix(&[0])
        .unwrap_or(bytes)
        .to_vec()
}

/// Decodes a fixed size output buffer that the kernel filled with a C
/// string. Everything from the first NUL onwards is dropped; a buffer
/// without a NUL is returned whole.
pub fn decode_cstr(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len());

    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn absent_is_null() {
        let mut encoded = encode(&LogicalValue::Absent).unwrap();
        let iov = encoded.iovec();

        assert!(encoded.is_null());
        assert!(iov.iov_base.is_null());
        assert_eq!(iov.iov_len, 0);
    }

    #[test]
    fn bytes_round_trip() {
        let inputs: &[&[u8]] = &[
            b"",
            b"/rescue",
            b"\xff\xfe binary",
            b"embedded\0nul",
        ];

        for input in inputs {
            let encoded = encode_bytes(input);

            assert_eq!(encoded.len(), input.len() + 1);
            assert_eq!(decode_bytes(encoded.as_bytes()), input.to_vec());
        }
    }

    #[test]
    fn bytes_already_terminated() {
        let encoded = encode_bytes(b"jail\0");

        assert_eq!(encoded.len(), 5);
        assert_eq!(encoded.as_bytes(), b"jail\0");
    }

    #[test]
    fn text_is_utf8_bytes() {
        let encoded = encode(&LogicalValue::from("jäil")).unwrap();

        assert_eq!(encoded.as_bytes(), "jäil\0".as_bytes());
    }

    #[test]
    fn integer_round_trip() {
        for n in [0, 1, -1, i64::from(i32::MAX), i64::from(i32::MIN)] {
            let encoded = encode(&LogicalValue::Integer(n)).unwrap();

            assert_eq!(encoded.len(), INT_SIZE);
            assert_eq!(i64::from(decode_integer(encoded.as_bytes()).unwrap()), n);
        }
    }

    #[test]
    fn integer_out_of_range() {
        let too_big = i64::from(i32::MAX) + 1;
        let too_small = i64::from(i32::MIN) - 1;

        assert!(matches!(encode_integer(too_big), Err(JailError::Range(n)) if n == too_big));
        assert!(matches!(encode_integer(too_small), Err(JailError::Range(_))));
    }

    #[test]
    fn integer_is_native_endian() {
        let encoded = encode_integer(0x0102_0304).unwrap();

        assert_eq!(encoded.as_bytes(), 0x0102_0304_i32.to_ne_bytes());
    }

    #[test]
    fn decode_integer_wrong_length() {
        assert!(decode_integer(&[]).is_err());
        assert!(decode_integer(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn decode_cstr_trims_at_first_nul() {
        assert_eq!(decode_cstr(b"abc\0def\0"), b"abc");
        assert_eq!(decode_cstr(b"\0\0\0"), b"");
        assert_eq!(decode_cstr(b"full"), b"full");
    }

    #[test]
    fn address_list_is_not_scalar() {
        let value = LogicalValue::AddressList(vec![]);

        assert!(matches!(encode(&value), Err(JailError::InvalidInput(_))));
    }
}
