// live: Jail parameter metadata read from the security.jail sysctl tree.
#![forbid(unsafe_code)]
use super::{
    ParamOracle,
    TypeLimit,
};
use crate::errors::JailError;
use ::sysctl::{
    Ctl,
    CtlType,
    CtlValue,
    Sysctl,
    SysctlError,
};
use tracing::debug;

// Default param length if we fail to get one from sysctl.
const DEFAULT_PARAM_LEN: usize = 256;

const CTL_JAIL_PARAM_PREFIX: &str = "security.jail.param.";
const CTL_JAIL_MAX_AF_IPS: &str   = "security.jail.jail_max_af_ips";

/// Reads parameter types from `security.jail.param.*` on the running
/// kernel.
///
/// The kernel describes each jail parameter as a sysctl whose type is the
/// parameter's type. For strings and structs, reading the sysctl returns
/// the maximum length or the struct size as a native int.
#[derive(Clone, Copy, Debug, Default)]
pub struct SysctlOracle;

impl SysctlOracle {
    /// Returns a new oracle.
    pub fn new() -> Self {
        Self
    }
}

impl ParamOracle for SysctlOracle {
    fn lookup(&self, name: &str) -> Result<TypeLimit, JailError> {
        let ctl_name = format!("{CTL_JAIL_PARAM_PREFIX}{name}");
        debug!("Reading jail parameter type from {ctl_name}");

        // Any failure to find the node means the kernel has no such
        // parameter.
        let Ok(ctl) = Ctl::new(&ctl_name) else {
            return Err(JailError::UnknownParameter(name.to_owned()));
        };

        let ctl_type = ctl.value_type().map_err(sysctl_error)?;

        let limit = match ctl_type {
            CtlType::String => {
                // The sysctl crate decodes string nodes as UTF-8, so a length
                // whose raw bytes are not valid UTF-8 is lost here.
                let len = ctl.value()
                    .ok()
                    .as_ref()
                    .and_then(size_from_value)
                    .unwrap_or_else(|| {
                        debug!(
                            "No length for {ctl_name}, using {DEFAULT_PARAM_LEN}",
                        );

                        DEFAULT_PARAM_LEN
                    });

                TypeLimit::string(len)
            },
            CtlType::Struct => {
                let size = ctl.value()
                    .ok()
                    .as_ref()
                    .and_then(size_from_value);

                TypeLimit::opaque(size)
            },
            CtlType::Int
            | CtlType::Uint
            | CtlType::Long
            | CtlType::Ulong
            | CtlType::S8
            | CtlType::S16
            | CtlType::S32
            | CtlType::S64
            | CtlType::U8
            | CtlType::U16
            | CtlType::U32
            | CtlType::U64 => TypeLimit::integer(),
            _ => TypeLimit::opaque(None),
        };

        Ok(limit)
    }

    fn max_af_ips(&self) -> Result<usize, JailError> {
        debug!("Reading {CTL_JAIL_MAX_AF_IPS}");

        let ctl = Ctl::new(CTL_JAIL_MAX_AF_IPS).map_err(sysctl_error)?;
        let value = ctl.value().map_err(sysctl_error)?;

        size_from_value(&value).ok_or_else(|| {
            let msg = format!("{CTL_JAIL_MAX_AF_IPS}: unexpected {value:?}");
            JailError::Sysctl(msg)
        })
    }
}

fn sysctl_error(err: SysctlError) -> JailError {
    JailError::Sysctl(err.to_string())
}

// The jail parameter handler answers every read with a native int, which the
// sysctl crate hands back according to the node's declared type: strings
// come back as the int's raw bytes, structs as a byte vector.
fn size_from_value(value: &CtlValue) -> Option<usize> {
    match value {
        CtlValue::Int(n)    => usize::try_from(*n).ok(),
        CtlValue::Uint(n)   => usize::try_from(*n).ok(),
        CtlValue::U32(n)    => usize::try_from(*n).ok(),
        CtlValue::Long(n)   => usize::try_from(*n).ok(),
        CtlValue::Ulong(n)  => usize::try_from(*n).ok(),
        CtlValue::String(s) => {
            s.trim_end_matches('\0')
                .parse()
                .ok()
                .or_else(|| raw_int(s.as_bytes()))
        },
        CtlValue::Struct(bytes) => raw_int(bytes),
        _ => None,
    }
}

fn raw_int(bytes: &[u8]) -> Option<usize> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    let n = i32::from_ne_bytes(raw);

    usize::try_from(n).ok().filter(|&n| n > 0)
}
