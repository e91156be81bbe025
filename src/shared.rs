//! A sensor session behind a mutex, for drivers reached from several tasks.
//!
//! Every operation has the driver to itself for the whole command sequence, so a
//! measurement cycle can never observe interrupt bits raised by an interleaved one. Closing
//! takes the driver out for good; later calls fail with [`Error::UseAfterClose`].
//!
//! In blocking builds the raw mutex `M` is only held while the driver is checked out of or
//! back into its slot, never across bus transfers or poll delays. A caller that finds the
//! driver checked out spins until it comes back.

#[cfg(not(feature = "async"))]
use core::cell::RefCell;

#[cfg(not(feature = "async"))]
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
#[cfg(feature = "async")]
use embassy_sync::mutex::Mutex;
#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::{Error, LogObserver, LuxReading, Observer, RangeReading, Vl6180x};

#[cfg(not(feature = "async"))]
enum Slot<S> {
    Ready(S),
    /// Checked out by a running operation
    Busy,
    Closed,
}

/// A [`Vl6180x`] guarded by an `embassy-sync` mutex.
///
/// `M` selects the raw mutex, e.g. `CriticalSectionRawMutex` when the sensor is shared
/// with other threads or cores, `NoopRawMutex` within a single executor. In blocking builds
/// the critical section only covers the check-out and check-in of the driver.
///
/// **Important**: blocking calls wait by spinning. Do not call them from an interrupt handler
/// that can preempt another caller of the same sensor.
///
/// # Examples
///
/// ```rust,no_run
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use vl6180x::{SharedVl6180x, Vl6180x};
///
/// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
/// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
/// let sensor: SharedVl6180x<CriticalSectionRawMutex, _, _> =
///     SharedVl6180x::new(Vl6180x::new(i2c, delay));
///
/// sensor.configure().unwrap();
/// let reading = sensor.read_range().unwrap();
/// println!("Distance: {} mm", reading.distance_mm);
///
/// let _driver = sensor.close().unwrap();
/// assert!(sensor.read_range().is_err());
/// ```
pub struct SharedVl6180x<M: RawMutex, I2C, D, O = LogObserver> {
    #[cfg(not(feature = "async"))]
    sensor: Mutex<M, RefCell<Slot<Vl6180x<I2C, D, O>>>>,
    #[cfg(feature = "async")]
    sensor: Mutex<M, Option<Vl6180x<I2C, D, O>>>,
}

impl<M: RawMutex, I2C, D, O> SharedVl6180x<M, I2C, D, O> {
    /// Wraps an open driver.
    pub fn new(sensor: Vl6180x<I2C, D, O>) -> Self {
        Self {
            #[cfg(not(feature = "async"))]
            sensor: Mutex::new(RefCell::new(Slot::Ready(sensor))),
            #[cfg(feature = "async")]
            sensor: Mutex::new(Some(sensor)),
        }
    }
}

/// A driver checked out of its [`SharedVl6180x`]; checked back in on drop, unwinding
/// included.
#[cfg(not(feature = "async"))]
struct Lease<'a, M: RawMutex, I2C, D, O> {
    shared: &'a SharedVl6180x<M, I2C, D, O>,
    sensor: Option<Vl6180x<I2C, D, O>>,
}

#[cfg(not(feature = "async"))]
impl<M: RawMutex, I2C, D, O> Drop for Lease<'_, M, I2C, D, O> {
    fn drop(&mut self) {
        if let Some(sensor) = self.sensor.take() {
            self.shared
                .sensor
                .lock(|slot| *slot.borrow_mut() = Slot::Ready(sensor));
        }
    }
}

#[cfg(not(feature = "async"))]
impl<M, I2C, E, D, O> SharedVl6180x<M, I2C, D, O>
where
    M: RawMutex,
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
    O: Observer,
{
    fn lease(&self) -> Result<Lease<'_, M, I2C, D, O>, Error<E>> {
        loop {
            let taken = self.sensor.lock(|slot| {
                let mut slot = slot.borrow_mut();
                match core::mem::replace(&mut *slot, Slot::Busy) {
                    Slot::Ready(sensor) => Some(Ok(sensor)),
                    Slot::Busy => None,
                    Slot::Closed => {
                        *slot = Slot::Closed;
                        Some(Err(Error::UseAfterClose))
                    }
                }
            });
            match taken {
                Some(Ok(sensor)) => {
                    return Ok(Lease {
                        shared: self,
                        sensor: Some(sensor),
                    })
                }
                Some(Err(error)) => return Err(error),
                None => core::hint::spin_loop(),
            }
        }
    }

    /// Runs `action` on the driver, with no other operation on this sensor in between.
    ///
    /// **Note**: `action` must not call back into this `SharedVl6180x`; it would spin forever.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * whatever `action` returns
    pub fn with_sensor<R>(
        &self,
        action: impl FnOnce(&mut Vl6180x<I2C, D, O>) -> Result<R, Error<E>>,
    ) -> Result<R, Error<E>> {
        let mut lease = self.lease()?;
        let sensor = lease.sensor.as_mut().ok_or(Error::UseAfterClose)?;
        action(sensor)
    }

    /// See [`Vl6180x::configure`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::configure`]
    pub fn configure(&self) -> Result<(), Error<E>> {
        self.with_sensor(|sensor| sensor.configure())
    }

    /// See [`Vl6180x::set_scaling`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::set_scaling`]
    pub fn set_scaling(&self, factor: u8) -> Result<(), Error<E>> {
        self.with_sensor(|sensor| sensor.set_scaling(factor))
    }

    /// See [`Vl6180x::read_range`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::read_range`]
    pub fn read_range(&self) -> Result<RangeReading, Error<E>> {
        self.with_sensor(|sensor| sensor.read_range())
    }

    /// See [`Vl6180x::read_lux`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::read_lux`]
    pub fn read_lux<G: Into<u8>>(&self, gain: G) -> Result<LuxReading, Error<E>> {
        self.with_sensor(|sensor| sensor.read_lux(gain))
    }

    /// Takes the driver out; every later call fails with [`Error::UseAfterClose`].
    ///
    /// Waits for a running operation to finish first. Call [`Vl6180x::close`] on the
    /// result to get the I2C bus back.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was already closed
    pub fn close(&self) -> Result<Vl6180x<I2C, D, O>, Error<E>> {
        let mut lease = self.lease()?;
        // still checked out, so nobody else touches the slot
        self.sensor.lock(|slot| *slot.borrow_mut() = Slot::Closed);
        lease.sensor.take().ok_or(Error::UseAfterClose)
    }

    /// `true` once [`close`](Self::close) succeeded.
    pub fn is_closed(&self) -> bool {
        self.sensor
            .lock(|slot| matches!(*slot.borrow(), Slot::Closed))
    }
}

#[cfg(feature = "async")]
impl<M, I2C, E, D, O> SharedVl6180x<M, I2C, D, O>
where
    M: RawMutex,
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
    O: Observer,
{
    /// See [`Vl6180x::configure`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::configure`]
    pub async fn configure(&self) -> Result<(), Error<E>> {
        let mut sensor = self.sensor.lock().await;
        sensor
            .as_mut()
            .ok_or(Error::UseAfterClose)?
            .configure()
            .await
    }

    /// See [`Vl6180x::set_scaling`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::set_scaling`]
    pub async fn set_scaling(&self, factor: u8) -> Result<(), Error<E>> {
        let mut sensor = self.sensor.lock().await;
        sensor
            .as_mut()
            .ok_or(Error::UseAfterClose)?
            .set_scaling(factor)
            .await
    }

    /// See [`Vl6180x::read_range`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::read_range`]
    pub async fn read_range(&self) -> Result<RangeReading, Error<E>> {
        let mut sensor = self.sensor.lock().await;
        sensor
            .as_mut()
            .ok_or(Error::UseAfterClose)?
            .read_range()
            .await
    }

    /// See [`Vl6180x::read_lux`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was closed
    /// * any error of [`Vl6180x::read_lux`]
    pub async fn read_lux<G: Into<u8>>(&self, gain: G) -> Result<LuxReading, Error<E>> {
        let mut sensor = self.sensor.lock().await;
        sensor
            .as_mut()
            .ok_or(Error::UseAfterClose)?
            .read_lux(gain)
            .await
    }

    /// Takes the driver out; every later call fails with [`Error::UseAfterClose`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::UseAfterClose)` - If the session was already closed
    pub async fn close(&self) -> Result<Vl6180x<I2C, D, O>, Error<E>> {
        self.sensor.lock().await.take().ok_or(Error::UseAfterClose)
    }

    /// `true` once [`close`](Self::close) succeeded.
    pub async fn is_closed(&self) -> bool {
        self.sensor.lock().await.is_none()
    }
}
