//! # VL6180X Time-of-Flight Distance and Ambient Light Sensor Driver
//!
//! This crate provides a `no_std` driver for ST-Microelectronics' VL6180X proximity and
//! ambient light sensor. The same source builds a blocking API (default) or an async API
//! (`async` feature) on top of `embedded-hal` / `embedded-hal-async`.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use vl6180x::Vl6180x;
//!
//! let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//! let mut sensor = Vl6180x::new(i2c, delay);
//!
//! sensor.configure().unwrap();
//!
//! let reading = sensor.read_range().unwrap();
//! if reading.is_valid() {
//!     println!("Distance: {} mm", reading.distance_mm);
//! }
//!
//! let light = sensor.read_lux(vl6180x::AlsGain::Gain1).unwrap();
//! println!("Ambient light: {} lux", light.lux);
//! ```
//!
//! Every polling loop is bounded by [`Config::timeout_ms`]; a device that never raises the
//! expected status bit produces [`Error::Timeout`] instead of hanging. Register traffic and
//! state machine transitions are reported to an [`Observer`], by default [`LogObserver`]
//! which forwards to `log` or `defmt` when one of those features is enabled.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod fmt; // <-- must be first module!

mod config;
mod measurement;
mod observer;
mod register;
mod shared;

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

pub use config::{Config, PRIVATE_TUNING, PUBLIC_DEFAULTS};
pub use measurement::{
    AlsGain, AlsState, LuxReading, RangeReading, RangeState, RangeStatus,
    ALS_INTEGRATION_PERIOD_MS,
};
pub use observer::{Event, LogObserver, Observer};
pub use register::{Register, DEFAULT_ADDRESS, MODEL_ID};
pub use shared::SharedVl6180x;

/// Largest payload accepted by [`Vl6180x::write_bytes`].
pub const MAX_BLOCK_WRITE: usize = 16;

/// Lifecycle of a sensor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Bound to the bus, configuration sequence not applied by this session
    Unconfigured,
    /// Model ID verified and configuration sequence applied
    Configured,
    /// The device answered with the wrong model ID; the session refuses further work
    Rejected(u8),
}

/// VL6180X time-of-flight distance and ambient light sensor driver.
///
/// The driver exclusively owns the I2C handle, so every command sequence (configuration,
/// scaling change, measurement cycle) runs to completion before the next one starts. Use
/// [`SharedVl6180x`] when several tasks need to reach the same sensor.
pub struct Vl6180x<I2C, D, O = LogObserver> {
    /// I2C interface for communication with the sensor
    i2c: I2C,
    /// Current 7-bit I2C address of the sensor
    address: u8,
    /// Delay implementation used between polls
    delay: D,
    /// Receives register traffic and state transitions
    observer: O,
    config: Config,
    /// Current range scaling factor (1, 2 or 3)
    scaling: u8,
    /// Part-to-part range offset at 1x scaling (signed mm), captured on first use
    ptp_offset: Option<i8>,
    state: SessionState,
}

impl<I2C, E, D> Vl6180x<I2C, D, LogObserver>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    /// Creates a new VL6180X driver bound to the default address (0x29).
    ///
    /// No bus traffic happens here; call [`configure`](Self::configure) to verify the
    /// device and load its settings.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::Vl6180x;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    ///
    /// let mut sensor = Vl6180x::new(i2c, delay);
    /// ```
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            address: DEFAULT_ADDRESS,
            delay,
            observer: LogObserver,
            config: Config::default(),
            scaling: 1,
            ptp_offset: None,
            state: SessionState::Unconfigured,
        }
    }

    /// Creates a new driver bound to `address`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `address` does not fit in 7 bits
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Result<Self, Error<E>> {
        if address > 0x7F {
            error!("Invalid I2C address: {}", address);
            return Err(Error::InvalidArgument);
        }
        let mut sensor = Self::new(i2c, delay);
        sensor.address = address;
        Ok(sensor)
    }
}

impl<I2C, D, O> Vl6180x<I2C, D, O> {
    /// Replaces the observer that receives register traffic and state transitions.
    ///
    /// Pass `()` to silence the driver entirely.
    pub fn with_observer<P: Observer>(self, observer: P) -> Vl6180x<I2C, D, P> {
        Vl6180x {
            i2c: self.i2c,
            address: self.address,
            delay: self.delay,
            observer,
            config: self.config,
            scaling: self.scaling,
            ptp_offset: self.ptp_offset,
            state: self.state,
        }
    }

    /// Replaces the driver configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Current driver configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sets the deadline, in milliseconds, applied to every status poll.
    pub fn set_timeout_ms(&mut self, timeout_ms: u32) {
        self.config.timeout_ms = timeout_ms;
    }

    /// Deadline, in milliseconds, applied to every status poll.
    pub fn timeout_ms(&self) -> u32 {
        self.config.timeout_ms
    }

    /// Current 7-bit I2C address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current range scaling factor.
    pub fn scaling(&self) -> u8 {
        self.scaling
    }

    /// Lifecycle state of this session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared access to the observer, e.g. to inspect what a recording observer captured.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Mutable access to the observer.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Ends the session and hands back the I2C and delay implementations.
    pub fn close(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D, O: Observer> Vl6180x<I2C, D, O> {
    fn notify(&mut self, event: &Event<'_>) {
        self.observer.on_event(event);
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<I2C, E, D, O> Vl6180x<I2C, D, O>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
    O: Observer,
{
    fn ensure_usable(&self) -> Result<(), Error<E>> {
        match self.state {
            SessionState::Rejected(model_id) => Err(Error::UnexpectedDeviceId(model_id)),
            _ => Ok(()),
        }
    }

    /// Changes the I2C address of the sensor.
    ///
    /// The new address is written to `I2C_SLAVE__DEVICE_ADDRESS` and the driver uses it
    /// for every following transfer. The sensor forgets it on power loss.
    ///
    /// # Arguments
    ///
    /// * `address` - The new 7-bit I2C address
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `address` does not fit in 7 bits
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::Vl6180x;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl6180x::new(i2c, delay);
    ///
    /// sensor.set_i2c_address(0x30).unwrap();
    /// sensor.configure().unwrap();
    /// ```
    pub async fn set_i2c_address(&mut self, address: u8) -> Result<(), Error<E>> {
        if address > 0x7F {
            error!("Invalid I2C address: {}", address);
            return Err(Error::InvalidArgument);
        }
        self.ensure_usable()?;
        self.write_byte(Register::I2cSlaveDeviceAddress, address)
            .await?;
        self.address = address;
        Ok(())
    }

    /// Reads the identification model ID (0xB4 on a VL6180X).
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn model_id(&mut self) -> Result<u8, Error<E>> {
        self.read_byte(Register::IdentificationModelId).await
    }

    /// Writes a single byte to a sensor register.
    ///
    /// Low-level passthrough: the address is sent big-endian followed by `value` in one
    /// write transfer. Undocumented addresses are accepted.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{Vl6180x, Register};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl6180x::new(i2c, delay);
    ///
    /// sensor.write_byte(Register::SystemInterruptClear, 0x07).unwrap();
    /// sensor.write_byte(0x0207u16, 0x01).unwrap();
    /// ```
    pub async fn write_byte<R>(&mut self, register_address: R, value: u8) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 3];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2] = value;
        self.notify(&Event::Write {
            register: reg,
            data: &buffer[2..],
        });
        self.i2c.write(self.address, &buffer).await?;
        Ok(())
    }

    /// Reads a single byte from a sensor register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn read_byte<R>(&mut self, register_address: R) -> Result<u8, Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut read_buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut read_buffer)
            .await?;
        self.notify(&Event::Read {
            register: reg,
            data: &read_buffer,
        });
        Ok(read_buffer[0])
    }

    /// Writes a big-endian 16-bit word starting at a sensor register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn write_word<R>(&mut self, register_address: R, value: u16) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 4];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..4].copy_from_slice(&value.to_be_bytes());
        self.notify(&Event::Write {
            register: reg,
            data: &buffer[2..],
        });
        self.i2c.write(self.address, &buffer).await?;
        Ok(())
    }

    /// Reads a big-endian 16-bit word starting at a sensor register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{Vl6180x, Register};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl6180x::new(i2c, delay);
    ///
    /// let raw_als = sensor.read_word(Register::ResultAlsVal).unwrap();
    /// println!("ALS count: {}", raw_als);
    /// ```
    pub async fn read_word<R>(&mut self, register_address: R) -> Result<u16, Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut read_buffer = [0u8; 2];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut read_buffer)
            .await?;
        self.notify(&Event::Read {
            register: reg,
            data: &read_buffer,
        });
        Ok(u16::from_be_bytes(read_buffer))
    }

    /// Writes consecutive registers in a single transfer, starting at `register_address`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `data` is longer than [`MAX_BLOCK_WRITE`]
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn write_bytes<R>(&mut self, register_address: R, data: &[u8]) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        if data.len() > MAX_BLOCK_WRITE {
            error!("Block write of {} bytes exceeds {}", data.len(), MAX_BLOCK_WRITE);
            return Err(Error::InvalidArgument);
        }
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 2 + MAX_BLOCK_WRITE];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..2 + data.len()].copy_from_slice(data);
        self.notify(&Event::Write {
            register: reg,
            data,
        });
        self.i2c
            .write(self.address, &buffer[..2 + data.len()])
            .await?;
        Ok(())
    }

    /// Reads consecutive registers, starting at `register_address`, into `buffer`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn read_bytes<R>(
        &mut self,
        register_address: R,
        buffer: &mut [u8],
    ) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), buffer)
            .await?;
        self.notify(&Event::Read {
            register: reg,
            data: &*buffer,
        });
        Ok(())
    }
}

/// Error type for VL6180X sensor operations.
///
/// Device-reported measurement faults are not errors: they come back as
/// [`RangeStatus`] inside a successful [`RangeReading`].
///
/// # Examples
///
/// ```rust,no_run
/// use vl6180x::{Error, Vl6180x};
///
/// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
/// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
/// let mut sensor = Vl6180x::new(i2c, delay);
///
/// match sensor.configure() {
///     Ok(()) => println!("Sensor configured"),
///     Err(Error::UnexpectedDeviceId(id)) => println!("Not a VL6180X: 0x{:02X}", id),
///     Err(Error::Timeout) => println!("Sensor did not respond in time"),
///     Err(Error::InvalidArgument) => println!("Invalid parameter provided"),
///     Err(Error::UseAfterClose) => println!("Session already closed"),
///     Err(Error::I2cError(e)) => println!("I2C communication error: {:?}", e),
/// }
/// ```
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// I2C communication error from the underlying hardware
    I2cError(E),
    /// The identification register did not hold the VL6180X model ID (value read is attached)
    UnexpectedDeviceId(u8),
    /// A status poll did not observe the expected bits before the deadline
    Timeout,
    /// Invalid parameter value provided
    InvalidArgument,
    /// The session was closed
    UseAfterClose,
}

impl<E: embedded_hal::i2c::Error> Error<E> {
    /// Classifies a transport failure (missing device, arbitration loss, ...).
    ///
    /// Returns `None` for errors that did not come from the bus.
    pub fn transport_kind(&self) -> Option<embedded_hal::i2c::ErrorKind> {
        match self {
            Error::I2cError(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::I2cError(e) => write!(f, "I2C error: {e:?}"),
            Error::UnexpectedDeviceId(id) => {
                write!(f, "unexpected model id {id:#04x}, expected {MODEL_ID:#04x}")
            }
            Error::Timeout => f.write_str("timed out waiting for the sensor"),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::UseAfterClose => f.write_str("sensor session is closed"),
        }
    }
}

impl<E: core::fmt::Debug> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}
