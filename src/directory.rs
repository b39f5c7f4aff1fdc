// directory: Looking up, creating, updating and removing jails.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::JailError;
use crate::frame::CallFrame;
use crate::oracle::{
    ParamCache,
    ParamOracle,
};
use crate::sys::{
    JailFlags,
    JailSys,
};
use crate::table::ParamTable;
use std::io;
use tracing::debug;

/// A jail as seen while walking the kernel's jail list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JailEntry {
    /// Jail ID
    pub jid: i32,
    /// Jail name
    pub name: String,
    /// True if the jail is being removed
    pub dying: bool,
}

/// Jail operations built on call frames.
///
/// Every operation builds a fresh table and frame, makes one kernel call,
/// and decodes the result. Nothing is kept between calls apart from the
/// shared parameter cache.
pub struct Directory<'c, S, O> {
    sys:    S,
    params: &'c ParamCache<O>,
}

impl<'c, S: JailSys, O: ParamOracle> Directory<'c, S, O> {
    /// A directory making its calls through `sys`, validating parameters
    /// against `params`.
    pub fn new(sys: S, params: &'c ParamCache<O>) -> Self {
        Self {
            sys,
            params,
        }
    }

    /// The parameter cache.
    pub fn params(&self) -> &'c ParamCache<O> {
        self.params
    }

    /// An empty parameter table for use with this directory.
    pub fn table(&self) -> ParamTable<'c, O> {
        ParamTable::new(self.params)
    }

    /// Returns the ID of the named jail.
    ///
    /// A negative value means the kernel has no such jail; that is passed
    /// back as is rather than turned into an error.
    pub fn resolve_id(&self, name: &str) -> Result<i32, JailError> {
        debug!("Resolving jail ID for {name}");

        let table = self.table().with("name", name)?;
        let (status, _) = self.call_get(table, JailFlags::empty());

        Ok(status)
    }

    /// Returns true if the jail is being removed.
    ///
    /// A jail the kernel does not know about is not dying.
    pub fn is_dying(&self, jid: i32) -> Result<bool, JailError> {
        debug!("Checking whether jail {jid} is dying");

        let table = self.table()
            .with("jid", jid)?
            .with("dying", 0)?;

        let (status, frame) = self.call_get(table, JailFlags::DYING);
        if status < 0 {
            debug!("jail_get for {jid} failed: {}", frame.error_message());
            return Ok(false);
        }

        Ok(frame.integer("dying")? > 0)
    }

    /// Creates a jail and returns its ID.
    pub fn create(&self, params: ParamTable<'c, O>) -> Result<i32, JailError> {
        self.set(params, JailFlags::CREATE)
    }

    /// Modifies an existing jail. The jail's ID is added to `params`.
    pub fn update(
        &self,
        jid: i32,
        mut params: ParamTable<'c, O>,
    ) -> Result<i32, JailError> {
        params.set("jid", jid)?;

        self.set(params, JailFlags::UPDATE)
    }

    /// Calls jail_set(2) with the given parameters and flags and returns the
    /// jail ID.
    pub fn set(
        &self,
        params: ParamTable<'c, O>,
        flags: JailFlags,
    ) -> Result<i32, JailError> {
        debug!("jail_set with {} parameters, flags: {flags:?}", params.len());

        let mut frame = CallFrame::new(params);
        let status = self.sys.set(&mut frame.build(), flags);

        self.check(status, &frame)
    }

    /// Calls jail_get(2) with the given parameters and flags.
    ///
    /// Returns the jail ID along with the frame, from which the values the
    /// kernel wrote can be decoded.
    pub fn get(
        &self,
        params: ParamTable<'c, O>,
        flags: JailFlags,
    ) -> Result<(i32, CallFrame<'c, O>), JailError> {
        debug!("jail_get with {} parameters, flags: {flags:?}", params.len());

        let (status, frame) = self.call_get(params, flags);
        let jid = self.check(status, &frame)?;

        Ok((jid, frame))
    }

    /// Removes a jail, killing all of its processes.
    pub fn remove(&self, jid: i32) -> Result<(), JailError> {
        debug!("Removing jail {jid}");

        let status = self.sys.remove(jid);
        if status < 0 {
            // jail_remove(2) takes no errmsg, errno is all there is.
            let err = JailError::KernelCall {
                code:    status,
                message: self.sys.last_os_error().to_string(),
            };

            return Err(err);
        }

        Ok(())
    }

    /// Returns the name of a jail, or `None` if there is no such jail.
    pub fn name_of(&self, jid: i32) -> Result<Option<String>, JailError> {
        debug!("Getting name of jail {jid}");

        let mut table = self.table().with("jid", jid)?;
        table.set_output("name")?;

        let (status, frame) = self.call_get(table, JailFlags::DYING);
        if status < 0 {
            let os_error = self.sys.last_os_error();

            if is_not_found(&os_error) {
                return Ok(None);
            }

            return Err(kernel_error(status, &frame, os_error));
        }

        Ok(Some(frame.text("name")?))
    }

    /// Returns the jail with the lowest ID above `lastjid`, or `None` once
    /// there are no more. Start from 0.
    pub fn next(&self, lastjid: i32) -> Result<Option<JailEntry>, JailError> {
        debug!("Getting next jail after {lastjid}");

        let mut table = self.table().with("lastjid", lastjid)?;
        table.set_output("name")?;
        table.set_output("dying")?;

        let (jid, frame) = self.call_get(table, JailFlags::DYING);

        // The kernel answers ENOENT past the last jail.
        if jid < 0 {
            let os_error = self.sys.last_os_error();

            if is_not_found(&os_error) {
                debug!("End of jail list: {}", frame.error_message());
                return Ok(None);
            }

            return Err(kernel_error(jid, &frame, os_error));
        }

        let entry = JailEntry {
            jid,
            name:  frame.text("name")?,
            dying: frame.integer("dying")? > 0,
        };

        Ok(Some(entry))
    }

    /// Iterates over all jails, including dying ones, in jail ID order.
    pub fn jails(&self) -> Jails<'_, 'c, S, O> {
        Jails {
            directory: self,
            lastjid:   0,
            done:      false,
        }
    }

    fn call_get(
        &self,
        params: ParamTable<'c, O>,
        flags: JailFlags,
    ) -> (i32, CallFrame<'c, O>) {
        let mut frame = CallFrame::new(params);
        let status = self.sys.get(&mut frame.build(), flags);

        (status, frame)
    }

    fn check(
        &self,
        status: i32,
        frame: &CallFrame<'c, O>,
    ) -> Result<i32, JailError> {
        if status >= 0 {
            return Ok(status);
        }

        Err(kernel_error(status, frame, self.sys.last_os_error()))
    }
}

fn is_not_found(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOENT)
}

// Prefers the kernel's own message over errno.
fn kernel_error<O: ParamOracle>(
    status: i32,
    frame: &CallFrame<'_, O>,
    os_error: io::Error,
) -> JailError {
    let mut message = frame.error_message();

    if message.is_empty() {
        message = os_error.to_string();
    }

    debug!("Jail call failed ({status}): {message}");

    JailError::KernelCall {
        code: status,
        message,
    }
}

/// Iterator over all jails, returned by [`Directory::jails`].
pub struct Jails<'d, 'c, S, O> {
    directory: &'d Directory<'c, S, O>,
    lastjid:   i32,
    done:      bool,
}

impl<S: JailSys, O: ParamOracle> Iterator for Jails<'_, '_, S, O> {
    type Item = Result<JailEntry, JailError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.directory.next(self.lastjid) {
            Ok(Some(entry)) => {
                self.lastjid = entry.jid;
                Some(Ok(entry))
            },
            Ok(None) => {
                self.done = true;
                None
            },
            Err(err) => {
                self.done = true;
                Some(Err(err))
            },
        }
    }
}
