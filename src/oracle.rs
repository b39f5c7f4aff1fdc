// oracle: Parameter type metadata from the running kernel, and the cache
//         that fronts it.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::JailError;
use crate::value::ParamName;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[cfg(target_os = "freebsd")]
mod live;
#[cfg(target_os = "freebsd")]
pub use self::live::SysctlOracle;

/// Default maximum number of addresses per family, as set by the
/// security.jail.jail_max_af_ips sysctl on a stock kernel.
pub const DEFAULT_MAX_AF_IPS: usize = 255;

/// Declared type of a jail parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Integer parameters, including booleans and jailsys enums
    Integer,
    /// NUL-terminated strings with a maximum length
    String,
    /// Anything else, such as address structs
    Opaque,
}

/// Type and size limit of a jail parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeLimit {
    /// What the kernel expects for the parameter
    pub kind: ParamKind,
    /// Maximum string length for strings, element size for opaque values
    pub max_length: Option<usize>,
}

impl TypeLimit {
    /// An integer parameter.
    pub fn integer() -> Self {
        Self {
            kind:       ParamKind::Integer,
            max_length: None,
        }
    }

    /// A string parameter of at most `max_length` bytes.
    pub fn string(max_length: usize) -> Self {
        Self {
            kind:       ParamKind::String,
            max_length: Some(max_length),
        }
    }

    /// An opaque parameter, optionally with a known element size.
    pub fn opaque(size: Option<usize>) -> Self {
        Self {
            kind:       ParamKind::Opaque,
            max_length: size,
        }
    }
}

/// Source of jail parameter metadata.
pub trait ParamOracle {
    /// Returns the type of the named parameter, or
    /// [`JailError::UnknownParameter`] if the kernel has no such parameter.
    fn lookup(&self, name: &str) -> Result<TypeLimit, JailError>;

    /// Maximum number of addresses of one family a jail may have.
    fn max_af_ips(&self) -> Result<usize, JailError>;
}

impl<O: ParamOracle + ?Sized> ParamOracle for &O {
    fn lookup(&self, name: &str) -> Result<TypeLimit, JailError> {
        (**self).lookup(name)
    }

    fn max_af_ips(&self) -> Result<usize, JailError> {
        (**self).max_af_ips()
    }
}

/// Parameter metadata held in memory.
///
/// Useful where the parameter table is known ahead of time, and in tests.
#[derive(Clone, Debug)]
pub struct StaticOracle {
    max_af_ips: usize,
    params:     HashMap<String, TypeLimit>,
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AF_IPS)
    }
}

impl StaticOracle {
    /// An oracle that knows no parameters.
    pub fn new(max_af_ips: usize) -> Self {
        Self {
            max_af_ips,
            params: HashMap::new(),
        }
    }

    /// An oracle preloaded with the common parameters of a stock FreeBSD
    /// kernel and their default limits.
    pub fn with_defaults() -> Self {
        Self::default()
            .with("jid", TypeLimit::integer())
            .with("lastjid", TypeLimit::integer())
            .with("dying", TypeLimit::integer())
            .with("persist", TypeLimit::integer())
            .with("parent", TypeLimit::integer())
            .with("securelevel", TypeLimit::integer())
            .with("enforce_statfs", TypeLimit::integer())
            .with("devfs_ruleset", TypeLimit::integer())
            .with("children.max", TypeLimit::integer())
            .with("children.cur", TypeLimit::integer())
            .with("vnet", TypeLimit::integer())
            .with("ip4", TypeLimit::integer())
            .with("ip6", TypeLimit::integer())
            .with("allow.set_hostname", TypeLimit::integer())
            .with("allow.raw_sockets", TypeLimit::integer())
            .with("allow.mount", TypeLimit::integer())
            .with("name", TypeLimit::string(256))
            .with("path", TypeLimit::string(1024))
            .with("host.hostname", TypeLimit::string(256))
            .with("host.domainname", TypeLimit::string(256))
            .with("host.hostuuid", TypeLimit::string(64))
            .with("osrelease", TypeLimit::string(32))
            .with("cpuset.id", TypeLimit::integer())
            .with("ip4.addr", TypeLimit::opaque(Some(4)))
            .with("ip6.addr", TypeLimit::opaque(Some(16)))
    }

    /// Adds or replaces a parameter.
    pub fn with(mut self, name: &str, limit: TypeLimit) -> Self {
        self.params.insert(name.to_owned(), limit);
        self
    }
}

impl ParamOracle for StaticOracle {
    fn lookup(&self, name: &str) -> Result<TypeLimit, JailError> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| JailError::UnknownParameter(name.to_owned()))
    }

    fn max_af_ips(&self) -> Result<usize, JailError> {
        Ok(self.max_af_ips)
    }
}

/// Read-through cache in front of a [`ParamOracle`].
///
/// The kernel's jail parameter table does not change while it is running,
/// so entries are never invalidated. One cache is normally created at
/// startup and shared for the lifetime of the process; lookups of
/// different names may run concurrently.
#[derive(Debug)]
pub struct ParamCache<O> {
    oracle:     O,
    max_af_ips: usize,
    limits:     RwLock<HashMap<ParamName, TypeLimit>>,
}

impl<O: ParamOracle> ParamCache<O> {
    /// Creates the cache, reading jail_max_af_ips from the oracle once.
    pub fn new(oracle: O) -> Result<Self, JailError> {
        let max_af_ips = oracle.max_af_ips()?;
        debug!("New ParamCache with max_af_ips: {max_af_ips}");

        Ok(Self {
            oracle,
            max_af_ips,
            limits: RwLock::new(HashMap::new()),
        })
    }

    /// The oracle behind the cache.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Maximum number of addresses per family.
    pub fn max_af_ips(&self) -> usize {
        self.max_af_ips
    }

    /// Number of cached parameters.
    pub fn len(&self) -> usize {
        self.limits.read().len()
    }

    /// True when nothing has been looked up yet.
    pub fn is_empty(&self) -> bool {
        self.limits.read().is_empty()
    }

    /// Returns the type of a parameter, asking the oracle on first use.
    ///
    /// A name that is unknown as written but is a `no`-prefixed boolean
    /// resolves to its base parameter's type.
    pub fn lookup(&self, name: &ParamName) -> Result<TypeLimit, JailError> {
        if let Some(limit) = self.limits.read().get(name) {
            return Ok(*limit);
        }

        let limit = self.fetch(name)?;

        // Another thread may have raced us here; both saw the same kernel
        // table, so whichever insert lands first is kept.
        let mut limits = self.limits.write();
        let limit = *limits.entry(name.clone()).or_insert(limit);

        Ok(limit)
    }

    fn fetch(&self, name: &ParamName) -> Result<TypeLimit, JailError> {
        debug!("Looking up jail parameter: {name}");

        let err = match self.oracle.lookup(&name.to_string()) {
            Ok(limit)                                 => return Ok(limit),
            Err(err @ JailError::UnknownParameter(_)) => err,
            Err(err)                                  => return Err(err),
        };

        let Some(base) = name.without_no_prefix() else {
            return Err(err);
        };

        match self.oracle.lookup(&base.to_string()) {
            Ok(limit) if limit.kind == ParamKind::Integer => Ok(limit),
            Ok(_) => {
                let msg = format!("{name}: {base} is not a boolean parameter");
                Err(JailError::InvalidInput(msg))
            },
            Err(JailError::UnknownParameter(_)) => Err(err),
            Err(err) => Err(err),
        }
    }
}
