use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::Error;

/// Polls before a gain update counts as timed out.
pub const UPDATE_TIMEOUT_POLLS: u32 = 10_000;
/// Sleep between two polls. The effective delay depends on the scheduler and is usually
/// much longer.
pub const POLL_INTERVAL: Duration = Duration::from_micros(1);

/// "Gain reduction changed" flag, set from the delivery thread and read by the control loop.
#[derive(Debug, Default)]
pub struct NotificationFlag {
    changed: AtomicBool,
    resets: AtomicU64,
}

impl NotificationFlag {
    pub fn new() -> Self {
        Self::default()
    }
    /// Clear the flag before issuing an update.
    pub fn reset(&self) {
        self.changed.store(false, Ordering::SeqCst);
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
    /// Record a delivery. Only ever sets the flag, never clears it.
    pub fn notify(&self, changed: bool) {
        if changed {
            self.changed.fetch_or(true, Ordering::SeqCst);
        }
    }
    pub fn is_set(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }
    /// Number of resets so far, i.e. the number of updates issued.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

/// Outcome of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The flag went from clear to set after `polls` polls.
    Confirmed { polls: u32 },
    /// No transition was seen within `polls` polls.
    TimedOut { polls: u32 },
}

impl Confirmation {
    pub fn polls(&self) -> u32 {
        match *self {
            Confirmation::Confirmed { polls } | Confirmation::TimedOut { polls } => polls,
        }
    }
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed { .. })
    }
}

/// Where the confirmer is in the current update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    PendingUpdate,
    Polling,
    Confirmed,
    TimedOut,
}

/// Issues one update at a time and waits for the stream to confirm it.
///
/// Confirmation means witnessing the flag go from clear to set. Finding it set is not
/// enough: a notification belonging to an earlier update may still arrive between the reset
/// and the poll.
#[derive(Debug)]
pub struct UpdateConfirmer {
    max_polls: u32,
    poll_interval: Duration,
    state: UpdateState,
}

impl Default for UpdateConfirmer {
    fn default() -> Self {
        Self::new(UPDATE_TIMEOUT_POLLS, POLL_INTERVAL)
    }
}

impl UpdateConfirmer {
    pub fn new(max_polls: u32, poll_interval: Duration) -> Self {
        Self {
            max_polls,
            poll_interval,
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Reset `flag`, run `request`, and wait for the change.
    ///
    /// The flag is observed once right after the reset, so a request that completes before
    /// returning is still seen as a transition. An error from `request` is returned as is
    /// and leaves the confirmer idle.
    pub fn apply<F>(&mut self, flag: &NotificationFlag, request: F) -> Result<Confirmation, Error>
    where
        F: FnOnce() -> Result<(), Error>,
    {
        self.state = UpdateState::PendingUpdate;
        flag.reset();
        let previous = flag.is_set();
        if let Err(e) = request() {
            self.state = UpdateState::Idle;
            return Err(e);
        }
        Ok(self.wait(flag, Some(previous)))
    }

    /// Poll `flag` until it is seen clear and then set, at most `max_polls` times.
    ///
    /// `previous` is an observation made before the first poll, if any.
    pub fn wait(&mut self, flag: &NotificationFlag, mut previous: Option<bool>) -> Confirmation {
        self.state = UpdateState::Polling;
        for polls in 0..self.max_polls {
            let current = flag.is_set();
            if previous == Some(false) && current {
                self.state = UpdateState::Confirmed;
                return Confirmation::Confirmed { polls };
            }
            previous = Some(current);
            thread::sleep(self.poll_interval);
        }
        self.state = UpdateState::TimedOut;
        Confirmation::TimedOut {
            polls: self.max_polls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn confirmer(max_polls: u32) -> UpdateConfirmer {
        UpdateConfirmer::new(max_polls, POLL_INTERVAL)
    }

    #[test]
    fn synchronous_completion_is_confirmed() {
        let flag = NotificationFlag::new();
        let mut c = confirmer(100);
        for _ in 0..50 {
            let r = c
                .apply(&flag, || {
                    flag.notify(true);
                    Ok(())
                })
                .unwrap();
            assert_eq!(r, Confirmation::Confirmed { polls: 0 });
            assert_eq!(c.state(), UpdateState::Confirmed);
        }
        assert_eq!(flag.resets(), 50);
    }
    #[test]
    fn stale_flag_is_not_a_confirmation() {
        let flag = NotificationFlag::new();
        flag.notify(true);
        let mut c = confirmer(200);
        let previous = flag.is_set();
        assert_eq!(
            c.wait(&flag, Some(previous)),
            Confirmation::TimedOut { polls: 200 }
        );
        assert_eq!(c.state(), UpdateState::TimedOut);
        assert_eq!(c.wait(&flag, None), Confirmation::TimedOut { polls: 200 });
    }
    #[test]
    fn silent_device_times_out_after_bound() {
        let flag = NotificationFlag::new();
        let mut c = confirmer(250);
        let r = c.apply(&flag, || Ok(())).unwrap();
        assert_eq!(r, Confirmation::TimedOut { polls: 250 });
        assert!(!r.is_confirmed());
        // the next update is issued normally
        let r = c
            .apply(&flag, || {
                flag.notify(true);
                Ok(())
            })
            .unwrap();
        assert!(r.is_confirmed());
    }
    #[test]
    fn late_notification_is_seen_as_edge() {
        let flag = Arc::new(NotificationFlag::new());
        let mut c = confirmer(1_000_000);
        let r = c
            .apply(&flag, || {
                let flag = flag.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    flag.notify(true);
                });
                Ok(())
            })
            .unwrap();
        assert!(r.is_confirmed());
        assert!(r.polls() > 0);
    }
    #[test]
    fn false_notifications_dont_set() {
        let flag = NotificationFlag::new();
        flag.notify(false);
        assert!(!flag.is_set());
        flag.notify(true);
        flag.notify(false);
        assert!(flag.is_set());
        flag.reset();
        assert!(!flag.is_set());
    }
    #[test]
    fn failed_request_leaves_idle() {
        let flag = NotificationFlag::new();
        let mut c = confirmer(10);
        let r = c.apply(&flag, || Err(Error::ValueError));
        assert!(matches!(r, Err(Error::ValueError)));
        assert_eq!(c.state(), UpdateState::Idle);
    }
}
