use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::types::ParamValue;
use super::ActionFlag;

/// Live state for one node identity: the latest values posted by the control
/// panel plus pending button presses.
#[derive(Debug, Clone, Default)]
pub struct ControlEntry {
    pub params: Option<Vec<ParamValue>>,
    pub flags: HashMap<ActionFlag, bool>,
    /// Store-wide stamp of the last write to this entry. Never reused, so a
    /// cleared and recreated entry can't look unchanged to a waiter.
    revision: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, ControlEntry>,
    next_revision: u64,
}

impl Inner {
    fn touch(&mut self, identity: &str) -> &mut ControlEntry {
        self.next_revision += 1;
        let revision = self.next_revision;
        let entry = self.entries.entry(identity.to_string()).or_default();
        entry.revision = revision;
        entry
    }

    fn revision_of(&self, identity: &str) -> u64 {
        self.entries.get(identity).map_or(0, |e| e.revision)
    }
}

/// Process-wide identity → [`ControlEntry`] map behind one lock.
///
/// Shared as `Arc<ParameterStore>` between the HTTP/WebSocket handlers and
/// every running node. All operations take the same lock, so each one is
/// atomic with respect to the others, across all identities.
pub struct ParameterStore {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
        }
    }

    // A panicking node thread must not take the store down for every other
    // node, so poisoning is ignored. No operation leaves an entry half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the live params for `identity`, creating the entry if needed.
    pub fn set_params(&self, identity: &str, values: Vec<ParamValue>) {
        let mut inner = self.lock();
        inner.touch(identity).params = Some(values);
        drop(inner);
        self.changed.notify_all();
    }

    /// Latest params for `identity`, or `defaults` verbatim if none were posted.
    pub fn get_params(&self, identity: &str, defaults: &[ParamValue]) -> Vec<ParamValue> {
        let inner = self.lock();
        inner
            .entries
            .get(identity)
            .and_then(|e| e.params.clone())
            .unwrap_or_else(|| defaults.to_vec())
    }

    /// Mark a button press for `identity`.
    pub fn set_flag(&self, identity: &str, flag: ActionFlag) {
        let mut inner = self.lock();
        inner.touch(identity).flags.insert(flag, true);
        drop(inner);
        self.changed.notify_all();
    }

    /// Returns true once per press: the flag is reset under the same lock
    /// acquisition that read it.
    pub fn check_and_clear_flag(&self, identity: &str, flag: ActionFlag) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(identity) else {
            return false;
        };
        match entry.flags.get_mut(&flag) {
            Some(pending) if *pending => {
                *pending = false;
                true
            }
            _ => false,
        }
    }

    /// Drop everything stored for `identity`. No-op if absent.
    pub fn clear_all(&self, identity: &str) {
        self.lock().entries.remove(identity);
    }

    /// Whether anything is stored for `identity`.
    #[cfg(test)]
    pub(crate) fn contains(&self, identity: &str) -> bool {
        self.lock().entries.contains_key(identity)
    }

    /// Current write stamp for `identity` (0 when absent). Pass it to
    /// [`wait_for_update`](Self::wait_for_update).
    pub fn revision(&self, identity: &str) -> u64 {
        self.lock().revision_of(identity)
    }

    /// Block until `identity` is written after `since`, or `timeout` elapses.
    /// Returns the revision observed on wake-up.
    pub fn wait_for_update(&self, identity: &str, since: u64, timeout: Duration) -> u64 {
        let guard = self.lock();
        let (guard, _timed_out) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| inner.revision_of(identity) == since)
            .unwrap_or_else(PoisonError::into_inner);
        guard.revision_of(identity)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Instant;

    fn p(v: i64) -> Vec<ParamValue> {
        vec![ParamValue::Int(v)]
    }

    #[test]
    fn get_params_falls_back_to_defaults() {
        let s = ParameterStore::new();
        let defaults = vec![ParamValue::Float(0.5), ParamValue::Str("crop".into())];
        assert_eq!(s.get_params("7", &defaults), defaults);
        assert!(!s.contains("7"));
    }

    #[test]
    fn set_params_overwrites() {
        let s = ParameterStore::new();
        s.set_params("7", p(1));
        s.set_params("7", p(2));
        assert_eq!(s.get_params("7", &p(0)), p(2));
    }

    #[test]
    fn identities_are_independent() {
        let s = ParameterStore::new();
        s.set_params("a", p(1));
        s.set_flag("a", ActionFlag::Apply);
        assert_eq!(s.get_params("b", &p(0)), p(0));
        assert!(!s.check_and_clear_flag("b", ActionFlag::Apply));
        assert!(s.check_and_clear_flag("a", ActionFlag::Apply));
    }

    #[test]
    fn flag_is_consumed_once() {
        let s = ParameterStore::new();
        s.set_flag("n", ActionFlag::Skip);
        assert!(!s.check_and_clear_flag("n", ActionFlag::Apply));
        assert!(s.check_and_clear_flag("n", ActionFlag::Skip));
        assert!(!s.check_and_clear_flag("n", ActionFlag::Skip));
    }

    #[test]
    fn set_flag_creates_entry_without_params() {
        let s = ParameterStore::new();
        s.set_flag("n", ActionFlag::Apply);
        assert!(s.contains("n"));
        assert_eq!(s.get_params("n", &p(3)), p(3));
    }

    #[test]
    fn clear_all_resets_everything() {
        let s = ParameterStore::new();
        s.set_params("n", p(9));
        s.set_flag("n", ActionFlag::Apply);
        s.set_flag("n", ActionFlag::Skip);
        s.clear_all("n");
        assert_eq!(s.get_params("n", &p(0)), p(0));
        assert!(!s.check_and_clear_flag("n", ActionFlag::Apply));
        assert!(!s.check_and_clear_flag("n", ActionFlag::Skip));
        // idempotent
        s.clear_all("n");
        assert!(!s.contains("n"));
    }

    #[test]
    fn end_to_end_scenario() {
        let s = ParameterStore::new();
        s.set_params("n1", p(50));
        assert_eq!(s.get_params("n1", &p(0)), p(50));
        s.set_flag("n1", ActionFlag::Apply);
        assert!(s.check_and_clear_flag("n1", ActionFlag::Apply));
        assert!(!s.check_and_clear_flag("n1", ActionFlag::Apply));
        s.clear_all("n1");
        assert_eq!(s.get_params("n1", &p(0)), p(0));
    }

    #[test]
    fn concurrent_check_and_clear_observes_one_press() {
        for _ in 0..50 {
            let s = Arc::new(ParameterStore::new());
            s.set_flag("n", ActionFlag::Apply);
            let workers = 8;
            let barrier = Arc::new(Barrier::new(workers));
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let s = s.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        s.check_and_clear_flag("n", ActionFlag::Apply)
                    })
                })
                .collect();
            let observed = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&seen| seen)
                .count();
            assert_eq!(observed, 1);
        }
    }

    #[test]
    fn revision_never_repeats_after_clear() {
        let s = ParameterStore::new();
        s.set_params("n", p(1));
        let first = s.revision("n");
        s.clear_all("n");
        assert_eq!(s.revision("n"), 0);
        s.set_params("n", p(1));
        assert!(s.revision("n") > first);
    }

    #[test]
    fn wait_for_update_times_out_without_writes() {
        let s = ParameterStore::new();
        let start = Instant::now();
        let rev = s.wait_for_update("n", 0, Duration::from_millis(30));
        assert_eq!(rev, 0);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_for_update_wakes_on_write() {
        let s = Arc::new(ParameterStore::new());
        let writer = {
            let s = s.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                s.set_flag("n", ActionFlag::Apply);
            })
        };
        let start = Instant::now();
        let rev = s.wait_for_update("n", 0, Duration::from_secs(10));
        writer.join().unwrap();
        assert!(rev > 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_ignores_other_identities() {
        let s = Arc::new(ParameterStore::new());
        let writer = {
            let s = s.clone();
            thread::spawn(move || s.set_params("other", p(1)))
        };
        let rev = s.wait_for_update("n", 0, Duration::from_millis(40));
        writer.join().unwrap();
        assert_eq!(rev, 0);
    }
}
