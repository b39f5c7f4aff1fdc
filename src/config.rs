// config: Jail parameter sets loaded from YAML files.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::JailError;
use crate::oracle::{
    ParamCache,
    ParamOracle,
};
use crate::table::{
    ParamMap,
    ParamTable,
};
use crate::value::{
    LogicalValue,
    ParamName,
};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

// A parameter value as written in YAML. Nulls are handled by the Option
// around it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Integer(i64),
    Text(String),
    Addresses(Vec<IpAddr>),
}

impl From<RawValue> for LogicalValue {
    fn from(value: RawValue) -> Self {
        match value {
            RawValue::Flag(flag)       => Self::Integer(i64::from(flag)),
            RawValue::Integer(n)       => Self::Integer(n),
            RawValue::Text(text)       => Self::Text(text),
            RawValue::Addresses(addrs) => Self::AddressList(addrs),
        }
    }
}

type RawParams = IndexMap<String, Option<RawValue>>;

/// An ordered set of jail parameters read from a YAML mapping, such as:
///
/// ```yaml
/// name: www
/// path: /jails/www
/// persist: ~
/// securelevel: 3
/// ip4.addr:
///   - 192.0.2.10
/// ```
///
/// Nulls are absent values, integers and booleans are integers, strings are
/// text and lists are IP addresses. Values are only checked against the
/// kernel's parameter types by [`ParamSet::into_table`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamSet {
    params: ParamMap<LogicalValue>,
}

impl ParamSet {
    /// Loads a parameter set from the YAML file at `path`.
    pub fn from_yaml(path: &Path) -> Result<Self, JailError> {
        debug!("Loading parameter set from {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let raw: Option<RawParams> = serde_yaml::from_reader(reader)?;

        Self::from_raw(raw.unwrap_or_default())
    }

    /// Loads a parameter set from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, JailError> {
        let raw: Option<RawParams> = serde_yaml::from_str(yaml)?;

        Self::from_raw(raw.unwrap_or_default())
    }

    /// Returns the value of a parameter.
    pub fn get<N: AsRef<[u8]>>(&self, name: N) -> Option<&LogicalValue> {
        let name = ParamName::new(name.as_ref()).ok()?;

        self.params.get(&name)
    }

    /// Parameters in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamName, &LogicalValue)> {
        self.params.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when the file set no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Validates every parameter against `params` and returns them as a
    /// table, in file order.
    pub fn into_table<O: ParamOracle>(
        self,
        params: &ParamCache<O>,
    ) -> Result<ParamTable<'_, O>, JailError> {
        let mut table = ParamTable::new(params);

        for (name, value) in self.params {
            table.set(&name, value)?;
        }

        Ok(table)
    }

    fn from_raw(raw: RawParams) -> Result<Self, JailError> {
        let mut params = ParamMap::with_capacity(raw.len());

        for (name, value) in raw {
            let name = ParamName::try_from(name)?;
            let value = value.map_or(LogicalValue::Absent, Into::into);

            params.insert(name, value);
        }

        debug!("Loaded {} parameters", params.len());

        Ok(Self {
            params,
        })
    }
}
