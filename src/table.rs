// table: Ordered name to value table of jail parameters, validated against
//        the kernel's parameter metadata as values are set.
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
use crate::oracle::{
    ParamCache,
    ParamKind,
    ParamOracle,
    TypeLimit,
};
use crate::value::{
    LogicalValue,
    ParamName,
};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// Insertion ordered map keyed by parameter name.
pub type ParamMap<V> = IndexMap<ParamName, V>;

// A value as given, next to the bytes the kernel will see for it.
#[derive(Clone, Debug)]
struct Slot {
    value:   LogicalValue,
    encoded: Encoded,
}

/// Jail parameters for a single kernel call.
///
/// Every value is checked and encoded as it is set, so a table only ever
/// holds values the kernel's parameter metadata allows. Names keep the
/// position of their first insertion; setting a name again replaces its
/// value in place.
pub struct ParamTable<'c, O> {
    params: &'c ParamCache<O>,
    slots:  ParamMap<Slot>,
}

impl<O> fmt::Debug for ParamTable<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(k, v)| (k, &v.value)))
            .finish()
    }
}

impl<'c, O: ParamOracle> ParamTable<'c, O> {
    /// An empty table validated against the given parameter cache.
    pub fn new(params: &'c ParamCache<O>) -> Self {
        Self {
            params,
            slots: ParamMap::new(),
        }
    }

    /// The parameter cache this table validates against.
    pub fn params(&self) -> &'c ParamCache<O> {
        self.params
    }

    /// Sets a parameter.
    ///
    /// On error the table is unchanged; an earlier value for the same name
    /// is kept.
    pub fn set<N, V>(&mut self, name: N, value: V) -> Result<(), JailError>
    where
        N: TryInto<ParamName, Error = JailError>,
        V: Into<LogicalValue>,
    {
        self.insert(name.try_into()?, value.into())
    }

    /// Builder style [`ParamTable::set`].
    pub fn with<N, V>(mut self, name: N, value: V) -> Result<Self, JailError>
    where
        N: TryInto<ParamName, Error = JailError>,
        V: Into<LogicalValue>,
    {
        self.set(name, value)?;
        Ok(self)
    }

    /// Reserves a zeroed buffer for the kernel to write the parameter's value
    /// into during jail_get(2). The buffer is sized from the parameter's
    /// metadata.
    pub fn set_output<N>(&mut self, name: N) -> Result<(), JailError>
    where
        N: TryInto<ParamName, Error = JailError>,
    {
        let name = name.try_into()?;
        let limit = self.params.lookup(&name)?;

        let size = match (limit.kind, limit.max_length) {
            (ParamKind::Integer, _) => {
                return self.insert(name, LogicalValue::Integer(0));
            },
            (ParamKind::String, Some(max_length)) => max_length,
            (ParamKind::Opaque, Some(size)) => {
                // Address parameters report the size of one element, room
                // is needed for as many as the kernel allows.
                match Family::from_element_size(size) {
                    Some(_) => size * self.params.max_af_ips(),
                    None    => size,
                }
            },
            (kind, None) => {
                let msg = format!("{name}: size of {kind:?} value is unknown");
                return Err(JailError::InvalidInput(msg));
            },
        };

        if size == 0 {
            return self.insert(name, LogicalValue::Absent);
        }

        self.insert(name, LogicalValue::ByteString(vec![0u8; size]))
    }

    /// The value last set for a name.
    pub fn get<N: AsRef<[u8]>>(&self, name: N) -> Option<&LogicalValue> {
        self.slot(name).map(|slot| &slot.value)
    }

    /// The encoded value for a name.
    pub fn encoded<N: AsRef<[u8]>>(&self, name: N) -> Option<&Encoded> {
        self.slot(name).map(|slot| &slot.encoded)
    }

    /// True if the name has been set.
    pub fn contains<N: AsRef<[u8]>>(&self, name: N) -> bool {
        self.slot(name).is_some()
    }

    /// Removes a parameter, keeping the order of the others.
    pub fn remove<N: AsRef<[u8]>>(&mut self, name: N) -> Option<LogicalValue> {
        let name = ParamName::new(name.as_ref()).ok()?;

        self.slots.shift_remove(&name).map(|slot| slot.value)
    }

    /// Names and encoded values in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&ParamName, &Encoded)> {
        self.slots.iter().map(encoded_entry)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn entries_mut(
        &mut self,
    ) -> impl Iterator<Item = (&ParamName, &mut Encoded)> {
        self.slots.iter_mut().map(encoded_entry_mut)
    }

    fn insert(
        &mut self,
        name: ParamName,
        value: LogicalValue,
    ) -> Result<(), JailError> {
        debug!("Setting jail parameter {name} ({})", value.kind());

        let limit = self.params.lookup(&name)?;
        let encoded = self.encode(&name, &value, limit)?;

        // Only reached once the value is known good, so a failed set never
        // disturbs the existing entry.
        self.slots.insert(name, Slot {
            value,
            encoded,
        });

        Ok(())
    }

    fn slot<N: AsRef<[u8]>>(&self, name: N) -> Option<&Slot> {
        let name = ParamName::new(name.as_ref()).ok()?;

        self.slots.get(&name)
    }

    // Checks that the value fits the parameter's declared kind and encodes
    // it.
    fn encode(
        &self,
        name: &ParamName,
        value: &LogicalValue,
        limit: TypeLimit,
    ) -> Result<Encoded, JailError> {
        match (limit.kind, value) {
            (_, value) if value.is_absent() => Ok(Encoded::absent()),

            (ParamKind::Integer, LogicalValue::Integer(n)) => {
                codec::encode_integer(*n)
            },

            (ParamKind::String, LogicalValue::ByteString(_))
            | (ParamKind::String, LogicalValue::Text(_)) => {
                let encoded = codec::encode(value)?;

                // Every encoded string carries exactly one terminator.
                let length = encoded.len() - 1;

                match limit.max_length {
                    Some(max_length) if length > max_length => {
                        Err(JailError::ValueTooLong {
                            name: name.to_string(),
                            length,
                            max_length,
                        })
                    },
                    _ => Ok(encoded),
                }
            },

            (ParamKind::Opaque, LogicalValue::ByteString(_)) => {
                codec::encode(value)
            },

            (ParamKind::Opaque, LogicalValue::AddressList(addrs)) => {
                let encoded = addr::encode(addrs, self.params.max_af_ips())?;

                let expected = limit.max_length
                    .and_then(Family::from_element_size);

                match (expected, addr::family(addrs)?) {
                    (Some(expected), Some(family)) if expected != family => {
                        let msg = format!(
                            "{name} takes {expected:?} addresses, got \
                             {family:?}",
                        );

                        Err(JailError::InvalidInput(msg))
                    },
                    _ => Ok(encoded),
                }
            },

            (kind, value) => {
                let msg = format!(
                    "{name} is a {kind:?} parameter and cannot take a {} \
                     value",
                    value.kind(),
                );

                Err(JailError::InvalidInput(msg))
            },
        }
    }
}

fn encoded_entry<'a>(
    (name, slot): (&'a ParamName, &'a Slot),
) -> (&'a ParamName, &'a Encoded) {
    (name, &slot.encoded)
}

fn encoded_entry_mut<'a>(
    (name, slot): (&'a ParamName, &'a mut Slot),
) -> (&'a ParamName, &'a mut Encoded) {
    (name, &mut slot.encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticOracle;
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;

    fn cache() -> ParamCache<StaticOracle> {
        let oracle = StaticOracle::with_defaults()
            .with("host.hostname", TypeLimit::string(32));

        ParamCache::new(oracle).unwrap()
    }

    fn names<O: ParamOracle>(table: &ParamTable<'_, O>) -> Vec<String> {
        table.entries().map(|(name, _)| name.to_string()).collect()
    }

    #[test]
    fn insertion_order() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("persist", LogicalValue::Absent).unwrap();
        table.set("path", "/rescue").unwrap();
        table.set("name", "test").unwrap();

        assert_eq!(names(&table), vec!["persist", "path", "name"]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("path", "/rescue").unwrap();
        table.set("name", "first").unwrap();
        table.set("path", "/tmp").unwrap();

        assert_eq!(names(&table), vec!["path", "name"]);
        assert_eq!(table.get("path"), Some(&LogicalValue::from("/tmp")));
        assert_eq!(table.encoded("path").unwrap().as_bytes(), b"/tmp\0");
    }

    #[test]
    fn text_and_bytes_names_are_one_key() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("name", "a").unwrap();
        table.set(&b"name"[..], "b").unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b"name"), Some(&LogicalValue::from("b")));
    }

    #[test]
    fn value_too_long_keeps_previous() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("host.hostname", "jail.example.org").unwrap();

        let long = "x".repeat(40);
        let res = table.set("host.hostname", long.as_str());

        assert!(matches!(
            res,
            Err(JailError::ValueTooLong { length: 40, max_length: 32, .. })
        ));
        assert_eq!(
            table.get("host.hostname"),
            Some(&LogicalValue::from("jail.example.org")),
        );
        assert_eq!(
            table.encoded("host.hostname").unwrap().as_bytes(),
            b"jail.example.org\0",
        );
    }

    #[test]
    fn value_at_max_length() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);

        let exact = "x".repeat(32);

        assert!(table.set("host.hostname", exact.as_str()).is_ok());
        assert_eq!(table.encoded("host.hostname").unwrap().len(), 33);
    }

    #[test]
    fn unknown_parameter() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let res = table.set("no.such.param", 1);

        assert!(matches!(res, Err(JailError::UnknownParameter(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn integer_for_string_parameter() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let res = table.set("path", 1);

        assert!(matches!(res, Err(JailError::InvalidInput(_))));
    }

    #[test]
    fn text_for_integer_parameter() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let res = table.set("jid", "1");

        assert!(matches!(res, Err(JailError::InvalidInput(_))));
    }

    #[test]
    fn integer_out_of_range_keeps_previous() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("jid", 5).unwrap();

        let res = table.set("jid", i64::from(i32::MAX) + 1);

        assert!(matches!(res, Err(JailError::Range(_))));
        assert_eq!(table.get("jid"), Some(&LogicalValue::Integer(5)));
    }

    #[test]
    fn address_list() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        ];
        table.set("ip4.addr", addrs).unwrap();

        assert_eq!(table.encoded("ip4.addr").unwrap().len(), 8);
    }

    #[test]
    fn address_list_wrong_family() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let addrs: Vec<IpAddr> = vec!["2001:db8::1".parse().unwrap()];
        let res = table.set("ip4.addr", addrs);

        assert!(matches!(res, Err(JailError::InvalidInput(_))));
    }

    #[test]
    fn address_list_too_many() {
        let oracle = StaticOracle::new(1)
            .with("ip4.addr", TypeLimit::opaque(Some(4)));
        let cache = ParamCache::new(oracle).unwrap();
        let mut table = ParamTable::new(&cache);
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        ];

        let res = table.set("ip4.addr", addrs);

        assert!(matches!(
            res,
            Err(JailError::TooManyAddresses { count: 2, max_count: 1 })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn address_list_mixed() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "2001:db8::1".parse().unwrap(),
        ];

        let res = table.set("ip4.addr", addrs);

        assert!(matches!(res, Err(JailError::MixedFamily)));
    }

    #[test]
    fn address_list_mixed_over_limit() {
        let oracle = StaticOracle::new(1)
            .with("ip4.addr", TypeLimit::opaque(Some(4)));
        let cache = ParamCache::new(oracle).unwrap();
        let mut table = ParamTable::new(&cache);
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "2001:db8::1".parse().unwrap(),
        ];

        let res = table.set("ip4.addr", addrs);

        assert!(matches!(res, Err(JailError::MixedFamily)));
        assert!(table.is_empty());
    }

    #[test]
    fn empty_address_list_is_absent_for_any_kind() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);

        table.set("persist", Vec::<IpAddr>::new()).unwrap();
        table.set("host.hostname", Vec::<IpAddr>::new()).unwrap();

        for name in ["persist", "host.hostname"] {
            let encoded = table.encoded(name).unwrap();

            assert!(encoded.is_null());
            assert_eq!(encoded.len(), 0);
        }
    }

    #[test]
    fn absent_for_any_kind() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set("persist", LogicalValue::Absent).unwrap();
        table.set("name", LogicalValue::Absent).unwrap();
        table.set("ip6.addr", Vec::<IpAddr>::new()).unwrap();

        for (_, encoded) in table.entries() {
            assert!(encoded.is_empty());
        }
    }

    #[test]
    fn set_output_sizes() {
        let cache = cache();
        let mut table = ParamTable::new(&cache);
        table.set_output("dying").unwrap();
        table.set_output("name").unwrap();
        table.set_output("ip6.addr").unwrap();

        assert_eq!(table.encoded("dying").unwrap().len(), 4);
        assert_eq!(table.encoded("name").unwrap().len(), 256);
        assert_eq!(
            table.encoded("ip6.addr").unwrap().len(),
            16 * cache.max_af_ips(),
        );
    }

    #[test]
    fn remove_keeps_order() {
        let cache = cache();
        let mut table = ParamTable::new(&cache)
            .with("jid", 1).unwrap()
            .with("name", "a").unwrap()
            .with("path", "/").unwrap();

        assert_eq!(table.remove("name"), Some(LogicalValue::from("a")));
        assert_eq!(names(&table), vec!["jid", "path"]);
        assert!(!table.contains("name"));
    }
}
