//! Real-time clock
//!
//! [`RtcClock`] validates every calendar time crossing the backend
//! boundary. Invalid input never reaches the backend, and an invalid
//! reading from the backend is never returned to the caller.

pub mod calendar;

pub use calendar::{days_in_month, is_leap_year, CalendarTime, Weekday};

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::device::{Device, DeviceAccessGuard, SharingPolicy};
use crate::error::{Error, Result};

/// Board-specific clock
pub trait RtcBackend: Send + Sync {
    /// Raw reading of the current time
    fn get_time(&self) -> Result<CalendarTime>;

    /// Program the clock; `time` is already validated
    fn set_time(&self, time: &CalendarTime) -> Result<()>;
}

/// A shared real-time clock
pub struct RtcClock {
    guard: DeviceAccessGuard,
    backend: Box<dyn RtcBackend>,
    initialized: AtomicBool,
}

impl RtcClock {
    pub fn new<B: RtcBackend + 'static>(backend: B) -> Self {
        Self {
            guard: DeviceAccessGuard::new(SharingPolicy::Shared),
            backend: Box::new(backend),
            initialized: AtomicBool::new(false),
        }
    }

    /// Check if the time was set successfully at least once
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Read the current time
    ///
    /// Backend errors are passed through. A reading that is not a real
    /// instant fails with [`Error::HardwareError`].
    pub fn get_time(&self) -> Result<CalendarTime> {
        let reading = self.backend.get_time()?;

        reading.validate().ok_or_else(|| {
            error!("RTC returned invalid time {}", reading);
            Error::HardwareError
        })
    }

    /// Set the current time
    ///
    /// Fails with [`Error::InvalidArgument`] without touching the backend
    /// if `time` is not a real instant. The backend receives the time with
    /// its derived fields recomputed.
    pub fn set_time(&self, time: &CalendarTime) -> Result<()> {
        let Some(time) = time.validate() else {
            error!("Failed to set time: invalid argument {}", time);
            return Err(Error::InvalidArgument);
        };

        if let Err(e) = self.backend.set_time(&time) {
            error!("Failed to set time: backend returned {}", e);
            return Err(e);
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }
}

impl Device for RtcClock {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        reading: Option<CalendarTime>,
        written: Vec<CalendarTime>,
        fail_set: Option<Error>,
    }

    #[derive(Clone, Default)]
    struct Scripted(Arc<Mutex<Script>>);

    impl RtcBackend for Scripted {
        fn get_time(&self) -> Result<CalendarTime> {
            self.0.lock().unwrap().reading.ok_or(Error::HardwareError)
        }

        fn set_time(&self, time: &CalendarTime) -> Result<()> {
            let mut script = self.0.lock().unwrap();
            if let Some(e) = script.fail_set {
                return Err(e);
            }
            script.written.push(*time);
            Ok(())
        }
    }

    fn clock() -> (Scripted, RtcClock) {
        let backend = Scripted::default();
        (backend.clone(), RtcClock::new(backend))
    }

    #[test]
    fn test_get_time_fills_derived_fields() {
        let (backend, rtc) = clock();
        backend.0.lock().unwrap().reading = Some(CalendarTime::new(2023, 6, 15, 12, 30, 45));

        let time = rtc.get_time().unwrap();
        assert_eq!((time.year, time.month, time.day), (2023, 6, 15));
        assert_eq!((time.hour, time.minute, time.second), (12, 30, 45));
        assert_eq!(time.weekday, Weekday::Thursday);
    }

    #[test]
    fn test_get_time_invalid_reading() {
        let (backend, rtc) = clock();
        backend.0.lock().unwrap().reading = Some(CalendarTime::new(2023, 4, 31, 8, 0, 0));

        assert_eq!(rtc.get_time(), Err(Error::HardwareError));
    }

    #[test]
    fn test_get_time_backend_error() {
        let (_, rtc) = clock();
        assert_eq!(rtc.get_time(), Err(Error::HardwareError));
    }

    #[test]
    fn test_set_invalid_time_skips_backend() {
        let (backend, rtc) = clock();

        assert_eq!(
            rtc.set_time(&CalendarTime::new(2023, 2, 29, 0, 0, 0)),
            Err(Error::InvalidArgument)
        );
        assert!(backend.0.lock().unwrap().written.is_empty());
        assert!(!rtc.is_initialized());
    }

    #[test]
    fn test_set_valid_time_initializes() {
        let (backend, rtc) = clock();

        rtc.set_time(&CalendarTime::new(2024, 2, 29, 6, 0, 0)).unwrap();
        assert!(rtc.is_initialized());

        let written = backend.0.lock().unwrap().written.clone();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].day_of_year, 60);
    }

    #[test]
    fn test_backend_failure_keeps_initialized_state() {
        let (backend, rtc) = clock();
        let time = CalendarTime::new(2023, 6, 15, 12, 30, 45);

        backend.0.lock().unwrap().fail_set = Some(Error::Timeout);
        assert_eq!(rtc.set_time(&time), Err(Error::Timeout));
        assert!(!rtc.is_initialized());

        backend.0.lock().unwrap().fail_set = None;
        rtc.set_time(&time).unwrap();

        backend.0.lock().unwrap().fail_set = Some(Error::HardwareError);
        assert_eq!(rtc.set_time(&time), Err(Error::HardwareError));
        assert!(rtc.is_initialized());
    }

    #[test]
    fn test_clock_is_shared() {
        let (_, rtc) = clock();

        rtc.open().unwrap();
        rtc.open().unwrap();
        assert_eq!(rtc.sharing_policy(), SharingPolicy::Shared);
        assert_eq!(rtc.guard().holders(), 2);
    }
}
