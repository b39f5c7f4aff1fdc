// frame: Assembles a parameter table into the iovec array handed to
//        jail_set(2) and jail_get(2), and decodes what the kernel wrote back.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::addr::{
    self,
    Family,
};
use crate::codec::{
    self,
    Encoded,
};
use crate::errors::JailError;
use crate::oracle::ParamOracle;
use crate::table::ParamTable;
use libc::{
    c_uint,
    c_void,
    iovec,
};
use std::net::IpAddr;
use tracing::trace;

/// Size of the buffer the kernel writes error messages into.
pub const ERRMSG_LEN: usize = 256;

// Name of the error message sentinel parameter.
const PARAM_ERRMSG: &[u8] = b"errmsg\0";

/// State for exactly one jail_set(2) or jail_get(2) call.
///
/// The frame owns the parameter table, whose encoded values double as the
/// buffers the kernel reads from and writes to, and the error message
/// buffer the kernel fills in when a call fails. Build a fresh frame for
/// every call.
pub struct CallFrame<'c, O> {
    table:  ParamTable<'c, O>,
    errmsg: [u8; ERRMSG_LEN],
}

impl<'c, O: ParamOracle> CallFrame<'c, O> {
    /// A frame for the given parameters with a zeroed error buffer.
    pub fn new(table: ParamTable<'c, O>) -> Self {
        Self {
            table,
            errmsg: [0; ERRMSG_LEN],
        }
    }

    /// The parameters of this call.
    pub fn table(&self) -> &ParamTable<'c, O> {
        &self.table
    }

    /// Gives back the parameters.
    pub fn into_table(self) -> ParamTable<'c, O> {
        self.table
    }

    /// Number of iovecs the kernel is handed: a name and a value for each
    /// parameter, plus the errmsg pair.
    pub fn descriptor_count(&self) -> usize {
        2 * self.table.len() + 2
    }

    /// Lays the frame out as the kernel expects it.
    ///
    /// The returned view borrows the frame, so none of the buffers it points
    /// into can move or be freed while it exists.
    pub fn build(&mut self) -> Iovecs<'_> {
        trace!("Building {} iovecs", self.descriptor_count());

        let mut names = Vec::with_capacity(self.table.len());
        let mut values = Vec::with_capacity(self.table.len());

        for (name, value) in self.table.entries_mut() {
            names.push(name.as_bytes_with_nul());
            values.push(value);
        }

        Iovecs {
            names,
            values,
            errmsg: &mut self.errmsg,
            iov:    Vec::new(),
        }
    }

    /// The error message the kernel left behind, up to its first NUL.
    pub fn error_message(&self) -> String {
        String::from_utf8_lossy(codec::decode_cstr(&self.errmsg)).into_owned()
    }

    /// Decodes an integer parameter after jail_get(2).
    pub fn integer<N: AsRef<[u8]>>(&self, name: N) -> Result<i32, JailError> {
        codec::decode_integer(self.encoded(name.as_ref())?.as_bytes())
    }

    /// Returns a string parameter after jail_get(2), up to its first NUL.
    pub fn bytes<N: AsRef<[u8]>>(&self, name: N) -> Result<Vec<u8>, JailError> {
        let encoded = self.encoded(name.as_ref())?;

        Ok(codec::decode_cstr(encoded.as_bytes()).to_vec())
    }

    /// Returns a string parameter after jail_get(2) as text. Invalid UTF-8 is
    /// replaced.
    pub fn text<N: AsRef<[u8]>>(&self, name: N) -> Result<String, JailError> {
        let bytes = self.bytes(name)?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns an address list parameter after jail_get(2).
    ///
    /// The kernel does not shrink the buffer, so unused trailing slots come
    /// back as unspecified addresses and are dropped.
    pub fn addresses<N: AsRef<[u8]>>(
        &self,
        name: N,
        family: Family,
    ) -> Result<Vec<IpAddr>, JailError> {
        let encoded = self.encoded(name.as_ref())?;

        let addrs = addr::decode(encoded.as_bytes(), family)
            .into_iter()
            .filter(|addr| !addr.is_unspecified())
            .collect();

        Ok(addrs)
    }

    fn encoded(&self, name: &[u8]) -> Result<&Encoded, JailError> {
        self.table.encoded(name).ok_or_else(|| {
            let msg = format!(
                "{} is not a parameter of this call",
                String::from_utf8_lossy(name),
            );

            JailError::InvalidInput(msg)
        })
    }
}

/// The iovec array of a [`CallFrame`], ready for the kernel.
///
/// Names come first and values second for every parameter, in table order,
/// followed by the `errmsg` name and the error buffer.
pub struct Iovecs<'f> {
    names:  Vec<&'f [u8]>,
    values: Vec<&'f mut Encoded>,
    errmsg: &'f mut [u8; ERRMSG_LEN],
    iov:    Vec<iovec>,
}

impl Iovecs<'_> {
    /// Number of iovecs.
    pub fn len(&self) -> usize {
        2 * self.names.len() + 2
    }

    /// Always false; the errmsg pair is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Bytes of the iovec at `index` in the flat array.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let pair = index / 2;
        let is_name = index % 2 == 0;

        if pair < self.names.len() {
            let bytes = match is_name {
                true  => self.names[pair],
                false => self.values[pair].as_bytes(),
            };

            return Some(bytes);
        }

        match (pair == self.names.len(), is_name) {
            (true, true)  => Some(PARAM_ERRMSG),
            (true, false) => Some(&self.errmsg[..]),
            (false, _)    => None,
        }
    }

    /// True if the iovec at `index` is a null pointer.
    pub fn is_null(&self, index: usize) -> bool {
        let pair = index / 2;

        index % 2 == 1
            && pair < self.values.len()
            && self.values[pair].is_null()
    }

    /// Bytes of every iovec, in the order the kernel sees them.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// The value buffer of a parameter.
    pub fn value<N: AsRef<[u8]>>(&self, name: N) -> Option<&[u8]> {
        let pair = self.position(name.as_ref())?;

        Some(self.values[pair].as_bytes())
    }

    /// The value buffer of a parameter, as the kernel would write to it.
    pub fn value_mut<N: AsRef<[u8]>>(&mut self, name: N) -> Option<&mut [u8]> {
        let pair = self.position(name.as_ref())?;

        Some(self.values[pair].as_mut_bytes())
    }

    /// The error message buffer, as the kernel would write to it.
    pub fn errmsg_mut(&mut self) -> &mut [u8] {
        &mut self.errmsg[..]
    }

    /// Pointer to the iovec array and its length, for passing to the kernel.
    ///
    /// The pointers are derived afresh on every call and stay valid until
    /// `self` is next used.
    pub fn as_raw_parts(&mut self) -> (*mut iovec, c_uint) {
        self.iov.clear();
        self.iov.reserve(self.len());

        for (name, value) in self.names.iter().zip(self.values.iter_mut()) {
            // The kernel only reads names.
            self.iov.push(iovec {
                iov_base: name.as_ptr() as *mut c_void,
                iov_len:  name.len(),
            });

            self.iov.push(value.iovec());
        }

        self.iov.push(iovec {
            iov_base: PARAM_ERRMSG.as_ptr() as *mut c_void,
            iov_len:  PARAM_ERRMSG.len(),
        });

        self.iov.push(iovec {
            iov_base: self.errmsg.as_mut_ptr().cast::<c_void>(),
            iov_len:  self.errmsg.len(),
        });

        (self.iov.as_mut_ptr(), self.iov.len() as c_uint)
    }

    fn position(&self, name: &[u8]) -> Option<usize> {
        self.names
            .iter()
            .position(|n| n.strip_suffix(&[0]) == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{
        ParamCache,
        StaticOracle,
        TypeLimit,
    };
    use crate::value::LogicalValue;
    use pretty_assertions::assert_eq;

    fn cache() -> ParamCache<StaticOracle> {
        ParamCache::new(StaticOracle::with_defaults()).unwrap()
    }

    #[test]
    fn persist_and_path_layout() {
        let cache = cache();
        let table = ParamTable::new(&cache)
            .with("persist", LogicalValue::Absent).unwrap()
            .with("path", "/rescue").unwrap();

        let mut frame = CallFrame::new(table);
        assert_eq!(frame.descriptor_count(), 6);

        let mut iov = frame.build();
        let lengths: Vec<usize> = iov.iter().map(<[u8]>::len).collect();

        assert_eq!(iov.len(), 6);
        assert_eq!(lengths, vec![8, 0, 5, 8, 7, ERRMSG_LEN]);
        assert_eq!(iov.get(0), Some(&b"persist\0"[..]));
        assert!(iov.is_null(1));
        assert_eq!(iov.get(2), Some(&b"path\0"[..]));
        assert_eq!(iov.get(3), Some(&b"/rescue\0"[..]));
        assert_eq!(iov.get(4), Some(&b"errmsg\0"[..]));
        assert_eq!(iov.get(6), None);

        let (ptr, count) = iov.as_raw_parts();
        assert!(!ptr.is_null());
        assert_eq!(count, 6);
    }

    #[test]
    fn raw_parts_point_at_frame_buffers() {
        let cache = cache();
        let table = ParamTable::new(&cache)
            .with("name", "www").unwrap()
            .with("persist", LogicalValue::Absent).unwrap();

        let mut frame = CallFrame::new(table);
        let mut iov = frame.build();
        let expected: Vec<(usize, bool)> = (0..iov.len())
            .map(|i| (iov.get(i).unwrap().len(), iov.is_null(i)))
            .collect();

        let (ptr, count) = iov.as_raw_parts();
        let raw: Vec<(usize, bool)> = (0..count as usize)
            .map(|i| (iov.iov[i].iov_len, iov.iov[i].iov_base.is_null()))
            .collect();

        assert_eq!(ptr, iov.iov.as_mut_ptr());
        assert_eq!(raw, expected);
    }

    #[test]
    fn count_is_two_per_entry_plus_errmsg() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);

        for (n, name) in ["jid", "name", "path", "persist", "ip4.addr"].iter().enumerate() {
            let value = match *name {
                "jid"      => LogicalValue::Integer(1),
                "persist"  => LogicalValue::Absent,
                "ip4.addr" => LogicalValue::AddressList(vec![]),
                _          => LogicalValue::from("x"),
            };
            table.set(*name, value).unwrap();

            let mut frame = CallFrame::new(table);
            assert_eq!(frame.build().len(), 2 * (n + 1) + 2);
            table = frame.into_table();
        }
    }

    #[test]
    fn empty_table_is_just_errmsg() {
        let cache = cache();
        let mut frame = CallFrame::new(ParamTable::new(&cache));
        let iov = frame.build();

        assert_eq!(iov.len(), 2);
        assert_eq!(iov.get(0), Some(&b"errmsg\0"[..]));
    }

    #[test]
    fn error_message_stops_at_nul() {
        let cache = cache();
        let mut frame = CallFrame::new(ParamTable::new(&cache));

        {
            let mut iov = frame.build();
            let msg = b"jail \"www\" not found";
            iov.errmsg_mut()[..msg.len()].copy_from_slice(msg);
        }

        assert_eq!(frame.error_message(), "jail \"www\" not found");
    }

    #[test]
    fn error_message_without_nul() {
        let cache = cache();
        let mut frame = CallFrame::new(ParamTable::new(&cache));
        frame.build().errmsg_mut().fill(b'e');

        assert_eq!(frame.error_message(), "e".repeat(ERRMSG_LEN));
    }

    #[test]
    fn error_message_empty() {
        let cache = cache();
        let frame = CallFrame::new(ParamTable::new(&cache));

        assert_eq!(frame.error_message(), "");
    }

    #[test]
    fn kernel_writes_are_decoded() {
        let oracle = StaticOracle::with_defaults()
            .with("name", TypeLimit::string(16));
        let cache = ParamCache::new(oracle).unwrap();

        let mut table = ParamTable::new(&cache);
        table.set("jid", 3).unwrap();
        table.set_output("dying").unwrap();
        table.set_output("name").unwrap();
        table.set_output("ip4.addr").unwrap();

        let mut frame = CallFrame::new(table);

        {
            let mut iov = frame.build();
            iov.value_mut("dying").unwrap().copy_from_slice(&1i32.to_ne_bytes());
            iov.value_mut("name").unwrap()[..3].copy_from_slice(b"www");
            iov.value_mut("ip4.addr").unwrap()[..4].copy_from_slice(&[192, 0, 2, 7]);
        }

        assert_eq!(frame.integer("jid").unwrap(), 3);
        assert_eq!(frame.integer("dying").unwrap(), 1);
        assert_eq!(frame.text("name").unwrap(), "www");
        assert_eq!(
            frame.addresses("ip4.addr", Family::Inet).unwrap(),
            vec!["192.0.2.7".parse::<IpAddr>().unwrap()],
        );
    }

    #[test]
    fn decoding_unknown_name() {
        let cache = cache();
        let frame = CallFrame::new(ParamTable::new(&cache));

        assert!(matches!(frame.integer("dying"), Err(JailError::InvalidInput(_))));
    }
}
