//! Per-process session: the mutable status store plus the output sink that
//! handlers write to.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use yangcli_dsl::CommandModel;

pub const HOSTNAME_FIELD: &str = "hostname";
pub const MGMT_IP_FIELD: &str = "mgmt-ip";
pub const ROUTE_FIELD: &str = "route";

/// Documentation address (RFC 5737) used as the demo management address.
pub const DEFAULT_MGMT_IP: &str = "192.0.2.1";
pub const ROUTE_SUMMARY: &str = "use 'show route [ipv4|ipv6]'";

/// Status field name → value. Unset fields are present with `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    values: BTreeMap<String, Option<String>>,
}

impl SessionState {
    /// Every declared status field starts unset; a few well-known fields get
    /// defaults when the schema declares them.
    pub fn for_model(model: &CommandModel) -> Self {
        let mut state = Self {
            values: model
                .status_fields()
                .iter()
                .map(|f| (f.name.clone(), None))
                .collect(),
        };

        if state.is_declared(HOSTNAME_FIELD) {
            state.set(HOSTNAME_FIELD, local_hostname());
        }
        if state.is_declared(MGMT_IP_FIELD) {
            state.set(MGMT_IP_FIELD, DEFAULT_MGMT_IP);
        }
        if state.is_declared(ROUTE_FIELD) {
            state.set(ROUTE_FIELD, ROUTE_SUMMARY);
        }
        state
    }

    pub fn is_declared(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_deref())
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), Some(value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Context handed to every handler.
pub struct Session {
    state: SessionState,
    out: Box<dyn Write>,
    interrupt: Arc<AtomicBool>,
}

impl Session {
    pub fn new(state: SessionState, out: Box<dyn Write>) -> Self {
        Self {
            state,
            out,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share the flag a SIGINT handler sets.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn out(&mut self) -> &mut dyn Write {
        self.out.as_mut()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn interrupt_flag(&self) -> &AtomicBool {
        &self.interrupt
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }
}

/// In-memory output sink for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub(crate) fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
