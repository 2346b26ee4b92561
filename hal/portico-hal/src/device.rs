//! Device lifecycle and sharing policy
//!
//! Every peripheral embeds a [`DeviceAccessGuard`] and routes its
//! open/close/opened-query through it. The guard is the synchronization
//! boundary: callers never need their own locking around lifecycle calls.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rule governing how many holders may have a device open at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SharingPolicy {
    /// At most one open holder
    #[default]
    Exclusive,
    /// Any number of open holders; closed when the last one leaves
    Shared,
}

#[derive(Debug, Clone, Copy)]
struct State {
    holders: usize,
    /// A first-open or last-close action is running outside the lock
    transition: bool,
}

/// Outcome of one locked step of a lifecycle call
enum Step {
    Done,
    RunAction,
    Wait,
}

/// Lifecycle state shared by every device type
///
/// Tracks the number of current open holders. Under
/// [`SharingPolicy::Exclusive`] the count never exceeds one.
///
/// The lock is only held to update the count. Device actions run outside
/// it while the guard is marked in transition; other lifecycle calls on
/// the same guard wait for the transition to settle.
pub struct DeviceAccessGuard {
    policy: SharingPolicy,
    state: Mutex<CriticalSectionRawMutex, Cell<State>>,
}

impl DeviceAccessGuard {
    /// Create a closed guard with the given policy
    pub const fn new(policy: SharingPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(Cell::new(State {
                holders: 0,
                transition: false,
            })),
        }
    }

    /// Sharing policy this guard enforces
    pub fn policy(&self) -> SharingPolicy {
        self.policy
    }

    /// Number of current open holders
    pub fn holders(&self) -> usize {
        self.state.lock(|state| state.get().holders)
    }

    /// Check if at least one holder has the device open
    pub fn is_opened(&self) -> bool {
        self.holders() > 0
    }

    /// Fail with [`Error::NotOpened`] unless the device is open
    pub fn ensure_opened(&self) -> Result<()> {
        if self.is_opened() {
            Ok(())
        } else {
            Err(Error::NotOpened)
        }
    }

    /// Open without any device-specific action
    pub fn open(&self) -> Result<()> {
        self.open_with(|| Ok(()))
    }

    /// Close without any device-specific action
    pub fn close(&self) -> Result<()> {
        self.close_with(|| Ok(()))
    }

    /// Open the device, running `on_first_open` for the `Closed -> Open`
    /// transition
    ///
    /// Concurrent openers wait until `on_first_open` finished, so they never
    /// observe the device open before the action completed. If it fails the
    /// device stays closed and its error is returned.
    pub fn open_with<F>(&self, on_first_open: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.settle(|state| {
            if state.holders == 0 {
                return Ok(Step::RunAction);
            }
            if self.policy == SharingPolicy::Exclusive {
                warn!("Failed to open: exclusive device is already opened");
                return Err(Error::AlreadyOpen);
            }
            state.holders += 1;
            Ok(Step::Done)
        })
        .and_then(|run| {
            if !run {
                return Ok(());
            }
            let result = on_first_open();
            self.finish(if result.is_ok() { 1 } else { 0 });
            result
        })
    }

    /// Close the device, running `on_last_close` when the last holder leaves
    ///
    /// If `on_last_close` fails the device stays open with its remaining
    /// holder and the error is returned.
    pub fn close_with<F>(&self, on_last_close: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.settle(|state| match state.holders {
            0 => {
                warn!("Failed to close: device is not opened");
                Err(Error::NotOpened)
            }
            1 => Ok(Step::RunAction),
            count => {
                debug!("Skipping close: device has {} other holders", count - 1);
                state.holders -= 1;
                Ok(Step::Done)
            }
        })
        .and_then(|run| {
            if !run {
                return Ok(());
            }
            let result = on_last_close();
            self.finish(if result.is_ok() { 0 } else { 1 });
            result
        })
    }

    /// Apply `step` once no transition is running
    ///
    /// Returns `true` if the caller now owns the transition and must run
    /// its action, then call [`Self::finish`].
    fn settle<S>(&self, mut step: S) -> Result<bool>
    where
        S: FnMut(&mut State) -> Result<Step>,
    {
        loop {
            let outcome = self.state.lock(|cell| {
                let mut state = cell.get();
                if state.transition {
                    return Ok(Step::Wait);
                }
                let outcome = step(&mut state)?;
                if let Step::RunAction = outcome {
                    state.transition = true;
                }
                cell.set(state);
                Ok(outcome)
            })?;

            match outcome {
                Step::Done => return Ok(false),
                Step::RunAction => return Ok(true),
                Step::Wait => core::hint::spin_loop(),
            }
        }
    }

    fn finish(&self, holders: usize) {
        self.state.lock(|cell| {
            cell.set(State {
                holders,
                transition: false,
            })
        });
    }
}

impl Default for DeviceAccessGuard {
    fn default() -> Self {
        Self::new(SharingPolicy::default())
    }
}

impl core::fmt::Debug for DeviceAccessGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceAccessGuard")
            .field("policy", &self.policy)
            .field("holders", &self.holders())
            .finish()
    }
}

/// Common capability of every peripheral
///
/// Implementors only provide access to their guard; lifecycle calls go
/// through it. Devices that must talk to their backend on open or close
/// override [`Device::open`] / [`Device::close`] using
/// [`DeviceAccessGuard::open_with`] / [`DeviceAccessGuard::close_with`].
pub trait Device: Send + Sync {
    /// Lifecycle guard of this device
    fn guard(&self) -> &DeviceAccessGuard;

    /// Open the device for use
    fn open(&self) -> Result<()> {
        self.guard().open()
    }

    /// Release one open holder
    fn close(&self) -> Result<()> {
        self.guard().close()
    }

    /// Check if the device is currently open
    fn is_opened(&self) -> bool {
        self.guard().is_opened()
    }

    /// Sharing policy of the device
    fn sharing_policy(&self) -> SharingPolicy {
        self.guard().policy()
    }
}
