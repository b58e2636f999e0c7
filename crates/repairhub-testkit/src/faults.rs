use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use repairhub_core::error::{HubError, HubResult, UpstreamSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Always,
}

/// Per-operation failure switches.
#[derive(Debug)]
pub struct Faults {
    system: UpstreamSystem,
    armed: Mutex<HashMap<&'static str, Mode>>,
}

impl Faults {
    pub fn new(system: UpstreamSystem) -> Self {
        Self {
            system,
            armed: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next call to `op` only.
    pub fn fail_once(&self, op: &'static str) {
        self.lock().insert(op, Mode::Once);
    }

    /// Fail every call to `op` until [`Faults::clear`].
    pub fn fail_always(&self, op: &'static str) {
        self.lock().insert(op, Mode::Always);
    }

    pub fn clear(&self, op: &'static str) {
        self.lock().remove(op);
    }

    /// Consume an armed fault for `op`, if any.
    pub fn check(&self, op: &'static str) -> HubResult<()> {
        let mut armed = self.lock();
        match armed.get(op).copied() {
            None => Ok(()),
            Some(mode) => {
                if mode == Mode::Once {
                    armed.remove(op);
                }
                Err(HubError::upstream(
                    self.system,
                    format!("injected failure in {op}"),
                ))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, Mode>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts calls per operation name.
#[derive(Debug, Default)]
pub struct CallLog {
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CallLog {
    pub fn record(&self, op: &'static str) {
        *self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default() += 1;
    }

    pub fn count(&self, op: &'static str) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_faults_disarm_after_firing() {
        let faults = Faults::new(UpstreamSystem::Directory);
        faults.fail_once("create_identity");
        assert!(faults.check("create_identity").is_err());
        assert!(faults.check("create_identity").is_ok());
    }

    #[test]
    fn always_faults_persist_until_cleared() {
        let faults = Faults::new(UpstreamSystem::ProfileStore);
        faults.fail_always("upsert");
        assert!(faults.check("upsert").is_err());
        assert!(faults.check("upsert").is_err());
        faults.clear("upsert");
        assert!(faults.check("upsert").is_ok());
    }

    #[test]
    fn call_log_counts_per_op() {
        let log = CallLog::default();
        log.record("get");
        log.record("get");
        log.record("upsert");
        assert_eq!(log.count("get"), 2);
        assert_eq!(log.count("delete"), 0);
        log.reset();
        assert_eq!(log.count("get"), 0);
    }
}
