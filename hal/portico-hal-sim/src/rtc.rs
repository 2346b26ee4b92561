//! Software RTC running off the host clock

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use portico_hal::rtc::{CalendarTime, RtcBackend};
use portico_hal::{Error, Result};

#[derive(Debug, Default)]
struct Clock {
    /// Seconds added to the host clock
    offset: i64,
    fault: Option<Error>,
    stuck_reading: Option<CalendarTime>,
}

/// Simulated RTC; clones share the same clock
#[derive(Debug, Clone, Default)]
pub struct SimRtc {
    clock: Arc<Mutex<Clock>>,
}

impl SimRtc {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every backend call with `fault`, or recover with `None`
    pub fn set_fault(&self, fault: Option<Error>) {
        self.lock().fault = fault;
    }

    /// Return `reading` verbatim from every read, as a corrupted clock
    /// register would
    pub fn set_stuck_reading(&self, reading: Option<CalendarTime>) {
        self.lock().stuck_reading = reading;
    }
}

fn host_seconds() -> Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::HardwareError)?;
    i64::try_from(elapsed.as_secs()).map_err(|_| Error::HardwareError)
}

impl RtcBackend for SimRtc {
    fn get_time(&self) -> Result<CalendarTime> {
        let clock = self.lock();
        if let Some(fault) = clock.fault {
            return Err(fault);
        }
        if let Some(reading) = clock.stuck_reading {
            return Ok(reading);
        }

        let seconds = host_seconds()?
            .checked_add(clock.offset)
            .ok_or(Error::HardwareError)?;
        CalendarTime::from_unix(seconds).ok_or(Error::HardwareError)
    }

    fn set_time(&self, time: &CalendarTime) -> Result<()> {
        let mut clock = self.lock();
        if let Some(fault) = clock.fault {
            return Err(fault);
        }

        clock.offset = time.to_unix() - host_seconds()?;
        log::debug!("Sim RTC set to {}", time);
        Ok(())
    }
}
