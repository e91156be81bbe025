//! Single-shot range and ambient light measurements, and range scaling.

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::register::{
    als_interrupt_field, range_error_code, range_interrupt_field, Register, CLEAR_ALL,
    INTERRUPT_ALS_MASK, INTERRUPT_ALS_SHIFT, INTERRUPT_NEW_SAMPLE_READY,
    RANGE_CHECK_EARLY_CONVERGENCE, RANGE_STATUS_DEVICE_READY, START_SINGLE_SHOT,
};
use crate::{Error, Event, Observer, Vl6180x};

/// `RANGE_SCALER` values indexed by scaling factor (index 0 unused).
const SCALER_VALUES: [u16; 4] = [0, 253, 127, 84];

/// Cross-talk valid height at 1x scaling, in millimeters.
const DEFAULT_CROSSTALK_VALID_HEIGHT: u8 = 20;

/// Interval between two reads of a status register while polling.
const POLL_INTERVAL_MS: u32 = 1;

/// Fixed high nibble of `SYSALS__ANALOGUE_GAIN` (dark gain).
const ALS_GAIN_HIGH_NIBBLE: u8 = 0x40;

/// ALS integration period used by [`Vl6180x::read_lux`].
pub const ALS_INTEGRATION_PERIOD_MS: u16 = 100;

/// Maps a `RANGE_SCALER` register value back to its scaling factor, 1 if unknown.
pub(crate) fn scaling_for_scaler(scaler: u16) -> i8 {
    match scaler {
        s if s == SCALER_VALUES[3] => 3,
        s if s == SCALER_VALUES[2] => 2,
        _ => 1,
    }
}

/// Device-reported quality code of a range measurement (bits 7:4 of `RESULT__RANGE_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeStatus {
    /// Valid measurement
    NoError,
    /// System error detected at power on, no measurement possible
    SystemError1,
    /// System error detected at power on, no measurement possible
    SystemError5,
    /// Early convergence estimate check failed
    EarlyConvergenceEstimateFail,
    /// No target detected before the maximum convergence time
    NoConvergence,
    /// Ignore threshold check failed
    RangeIgnore,
    /// Ambient conditions too high, signal-to-noise too low
    SignalToNoise,
    /// Raw range algorithm underflow
    RawRangeUnderflow,
    /// Raw range algorithm overflow
    RawRangeOverflow,
    /// Compensated range underflow
    RangeUnderflow,
    /// Compensated range overflow
    RangeOverflow,
    /// Undocumented code
    Unknown(u8),
}

impl RangeStatus {
    /// `true` for [`RangeStatus::NoError`].
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == RangeStatus::NoError
    }
}

impl From<u8> for RangeStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => RangeStatus::NoError,
            1 => RangeStatus::SystemError1,
            5 => RangeStatus::SystemError5,
            6 => RangeStatus::EarlyConvergenceEstimateFail,
            7 => RangeStatus::NoConvergence,
            8 => RangeStatus::RangeIgnore,
            11 => RangeStatus::SignalToNoise,
            12 => RangeStatus::RawRangeUnderflow,
            13 => RangeStatus::RawRangeOverflow,
            14 => RangeStatus::RangeUnderflow,
            15 => RangeStatus::RangeOverflow,
            _ => {
                warn!("Unknown range status: {}", code);
                RangeStatus::Unknown(code)
            }
        }
    }
}

impl From<RangeStatus> for u8 {
    fn from(status: RangeStatus) -> Self {
        match status {
            RangeStatus::NoError => 0,
            RangeStatus::SystemError1 => 1,
            RangeStatus::SystemError5 => 5,
            RangeStatus::EarlyConvergenceEstimateFail => 6,
            RangeStatus::NoConvergence => 7,
            RangeStatus::RangeIgnore => 8,
            RangeStatus::SignalToNoise => 11,
            RangeStatus::RawRangeUnderflow => 12,
            RangeStatus::RawRangeOverflow => 13,
            RangeStatus::RangeUnderflow => 14,
            RangeStatus::RangeOverflow => 15,
            RangeStatus::Unknown(code) => code,
        }
    }
}

/// One range measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangeReading {
    /// Raw `RESULT__RANGE_VAL`, in millimeters at 1x scaling
    pub distance_mm: u8,
    /// Quality code reported by the sensor for this measurement
    pub status: RangeStatus,
    /// Scaling factor in effect when the measurement was taken
    pub scaling: u8,
}

impl RangeReading {
    /// `true` if the sensor reported no error.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status.is_ok()
    }

    /// Distance in millimeters with the scaling factor applied.
    #[must_use]
    pub fn scaled_distance_mm(&self) -> u16 {
        u16::from(self.distance_mm) * u16::from(self.scaling)
    }
}

/// ALS analogue gain settings, with their register codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlsGain {
    /// 20x gain
    Gain20 = 0x00,
    /// 10x gain
    Gain10 = 0x01,
    /// 5x gain
    Gain5 = 0x02,
    /// 2.5x gain
    Gain2_5 = 0x03,
    /// 1.67x gain
    Gain1_67 = 0x04,
    /// 1.25x gain
    Gain1_25 = 0x05,
    /// 1x gain
    Gain1 = 0x06,
    /// 40x gain
    Gain40 = 0x07,
}

impl AlsGain {
    /// Highest documented gain code.
    pub const MAX_CODE: u8 = 0x07;

    /// Gain for `code`, clamped to [`AlsGain::MAX_CODE`].
    #[must_use]
    pub fn from_code_clamped(code: u8) -> Self {
        match code {
            0x00 => AlsGain::Gain20,
            0x01 => AlsGain::Gain10,
            0x02 => AlsGain::Gain5,
            0x03 => AlsGain::Gain2_5,
            0x04 => AlsGain::Gain1_67,
            0x05 => AlsGain::Gain1_25,
            0x06 => AlsGain::Gain1,
            _ => AlsGain::Gain40,
        }
    }

    /// Analogue gain multiplier.
    #[must_use]
    pub fn multiplier(self) -> f32 {
        match self {
            AlsGain::Gain20 => 20.0,
            AlsGain::Gain10 => 10.0,
            AlsGain::Gain5 => 5.0,
            AlsGain::Gain2_5 => 2.5,
            AlsGain::Gain1_67 => 1.67,
            AlsGain::Gain1_25 => 1.25,
            AlsGain::Gain1 => 1.0,
            AlsGain::Gain40 => 40.0,
        }
    }
}

impl From<AlsGain> for u8 {
    fn from(gain: AlsGain) -> Self {
        gain as u8
    }
}

/// One ambient light measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LuxReading {
    /// Raw `RESULT__ALS_VAL` count
    pub raw: u16,
    /// Analogue gain the measurement was taken with
    pub gain: AlsGain,
    /// Integration period in milliseconds
    pub integration_ms: u16,
    /// Illuminance in lux
    pub lux: f32,
}

impl LuxReading {
    /// Converts a raw count: `raw * resolution / gain * (100 / integration_ms)`.
    ///
    /// `lux_resolution` is lux per count at 1x gain and 100 ms integration.
    #[must_use]
    pub fn from_raw(raw: u16, gain: AlsGain, integration_ms: u16, lux_resolution: f32) -> Self {
        let lux = f32::from(raw) * lux_resolution / gain.multiplier() * 100.0
            / f32::from(integration_ms.max(1));
        Self {
            raw,
            gain,
            integration_ms,
            lux,
        }
    }
}

/// States of the range measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeState {
    /// Waiting for the device-ready bit
    Idle,
    /// Single-shot start written
    Triggered,
    /// Waiting for the range interrupt
    Polling,
    /// Reading result and status
    ResultReady,
    /// Interrupts cleared
    Cleared,
}

/// States of the ambient light measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlsState {
    /// Writing interrupt source, integration period and gain
    Configuring,
    /// Single-shot start written
    Triggered,
    /// Waiting for the ALS interrupt
    Polling,
    /// Reading the result
    ResultReady,
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
    /// Reads `register` until `ready` accepts its value or the deadline passes.
    ///
    /// The register is read fresh on every attempt, with [`POLL_INTERVAL_MS`] between
    /// attempts, until [`Config::timeout_ms`](crate::Config::timeout_ms) worth of delay
    /// has elapsed. Returns the accepted value.
    async fn poll_register<F>(&mut self, register: Register, mut ready: F) -> Result<u8, Error<E>>
    where
        F: FnMut(u8) -> bool,
    {
        let timeout_ms = self.config.timeout_ms;
        let mut waited_ms = 0u32;
        loop {
            let value = self.read_byte(register).await?;
            if ready(value) {
                break Ok(value);
            }

            if waited_ms >= timeout_ms {
                warn!(
                    "Timed out after {} ms polling register {:#x}",
                    waited_ms,
                    u16::from(register)
                );
                break Err(Error::Timeout);
            }

            self.delay.delay_ms(POLL_INTERVAL_MS).await;
            waited_ms += POLL_INTERVAL_MS;
        }
    }

    /// Performs one single-shot range measurement.
    ///
    /// Waits for the device-ready bit, starts the measurement, waits for the range
    /// interrupt, reads the distance and status, then clears all interrupts. The clear
    /// happens whatever status the sensor reported.
    ///
    /// **Note**: a nonzero status is not an error. It is returned in
    /// [`RangeReading::status`] and it is up to the caller to discard the distance.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If a status bit did not appear before the deadline; retry
    ///   the whole measurement
    /// * `Err(Error::UnexpectedDeviceId(id))` - If `configure` rejected the device
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{RangeStatus, Vl6180x};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl6180x::new(i2c, delay);
    ///
    /// sensor.configure().unwrap();
    /// let reading = sensor.read_range().unwrap();
    /// match reading.status {
    ///     RangeStatus::NoError => println!("Distance: {} mm", reading.distance_mm),
    ///     RangeStatus::NoConvergence => println!("No target"),
    ///     status => println!("Measurement unreliable: {:?}", status),
    /// }
    /// ```
    pub async fn read_range(&mut self) -> Result<RangeReading, Error<E>> {
        self.ensure_usable()?;

        self.notify(&Event::Range(RangeState::Idle));
        self.poll_register(Register::ResultRangeStatus, |status| {
            status & RANGE_STATUS_DEVICE_READY != 0
        })
        .await?;

        self.notify(&Event::Range(RangeState::Triggered));
        self.write_byte(Register::SysrangeStart, START_SINGLE_SHOT)
            .await?;

        self.notify(&Event::Range(RangeState::Polling));
        self.poll_register(Register::ResultInterruptStatusGpio, |status| {
            range_interrupt_field(status) == INTERRUPT_NEW_SAMPLE_READY
        })
        .await?;

        self.notify(&Event::Range(RangeState::ResultReady));
        let distance_mm = self.read_byte(Register::ResultRangeVal).await?;
        let status = self.range_status().await?;

        self.notify(&Event::Range(RangeState::Cleared));
        self.clear_interrupts().await?;

        if !status.is_ok() {
            debug!("Range measurement reported {:?}", status);
        }
        Ok(RangeReading {
            distance_mm,
            status,
            scaling: self.scaling,
        })
    }

    /// Reads the status code of the last range measurement.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn range_status(&mut self) -> Result<RangeStatus, Error<E>> {
        let status = self.read_byte(Register::ResultRangeStatus).await?;
        Ok(RangeStatus::from(range_error_code(status)))
    }

    /// Performs one single-shot ambient light measurement.
    ///
    /// Gain codes above [`AlsGain::MAX_CODE`] are clamped to it (40x), never rejected.
    /// The integration period is fixed at [`ALS_INTEGRATION_PERIOD_MS`] and the result
    /// is converted with [`Config::lux_resolution`](crate::Config::lux_resolution).
    ///
    /// # Arguments
    ///
    /// * `gain` - An [`AlsGain`] or a raw gain code
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If the ALS interrupt did not appear before the deadline
    /// * `Err(Error::UnexpectedDeviceId(id))` - If `configure` rejected the device
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{AlsGain, Vl6180x};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl6180x::new(i2c, delay);
    ///
    /// sensor.configure().unwrap();
    /// let reading = sensor.read_lux(AlsGain::Gain5).unwrap();
    /// println!("{} lux (raw {})", reading.lux, reading.raw);
    /// ```
    pub async fn read_lux<G>(&mut self, gain: G) -> Result<LuxReading, Error<E>>
    where
        G: Into<u8>,
    {
        self.ensure_usable()?;
        let code = gain.into();
        if code > AlsGain::MAX_CODE {
            debug!("Clamping ALS gain code {} to {}", code, AlsGain::MAX_CODE);
        }
        let gain = AlsGain::from_code_clamped(code);

        self.notify(&Event::Als(AlsState::Configuring));
        let interrupt_config = self
            .read_byte(Register::SystemInterruptConfigGpio)
            .await?;
        let interrupt_config = (interrupt_config & !INTERRUPT_ALS_MASK)
            | (INTERRUPT_NEW_SAMPLE_READY << INTERRUPT_ALS_SHIFT);
        self.write_byte(Register::SystemInterruptConfigGpio, interrupt_config)
            .await?;
        let [period_hi, period_lo] = ALS_INTEGRATION_PERIOD_MS.to_be_bytes();
        self.write_byte(Register::SysalsIntegrationPeriodHi, period_hi)
            .await?;
        self.write_byte(Register::SysalsIntegrationPeriodLo, period_lo)
            .await?;
        self.write_byte(
            Register::SysalsAnalogueGain,
            ALS_GAIN_HIGH_NIBBLE | u8::from(gain),
        )
        .await?;

        self.notify(&Event::Als(AlsState::Triggered));
        self.write_byte(Register::SysalsStart, START_SINGLE_SHOT)
            .await?;

        self.notify(&Event::Als(AlsState::Polling));
        self.poll_register(Register::ResultInterruptStatusGpio, |status| {
            als_interrupt_field(status) == INTERRUPT_NEW_SAMPLE_READY
        })
        .await?;

        self.notify(&Event::Als(AlsState::ResultReady));
        let raw = self.read_word(Register::ResultAlsVal).await?;
        // A latched ALS-ready code would satisfy the next poll before the new sample exists.
        self.clear_interrupts().await?;

        Ok(LuxReading::from_raw(
            raw,
            gain,
            ALS_INTEGRATION_PERIOD_MS,
            self.config.lux_resolution,
        ))
    }

    /// Clears the range, ALS and error interrupts.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn clear_interrupts(&mut self) -> Result<(), Error<E>> {
        self.write_byte(Register::SystemInterruptClear, CLEAR_ALL)
            .await
    }

    /// Sets the range scaling factor.
    ///
    /// Scaling trades resolution for reach: at 2x and 3x the raw 8-bit result covers
    /// two and three times the distance. The range scaler, part-to-part offset, cross-talk
    /// valid height and early convergence check are rewritten together.
    ///
    /// # Arguments
    ///
    /// * `factor` - 1, 2 or 3
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `factor` is not 1, 2 or 3 (no I/O happens)
    /// * `Err(Error::UnexpectedDeviceId(id))` - If `configure` rejected the device
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
    /// sensor.configure().unwrap();
    /// sensor.set_scaling(3).unwrap();
    /// let reading = sensor.read_range().unwrap();
    /// println!("Distance: {} mm", reading.scaled_distance_mm());
    /// ```
    pub async fn set_scaling(&mut self, factor: u8) -> Result<(), Error<E>> {
        if !(1..=3).contains(&factor) {
            error!("Invalid scaling factor: {}", factor);
            return Err(Error::InvalidArgument);
        }
        self.ensure_usable()?;
        self.apply_scaling(factor).await
    }

    pub(crate) async fn apply_scaling(&mut self, factor: u8) -> Result<(), Error<E>> {
        let ptp_offset = self.part_to_part_offset().await?;

        self.write_word(Register::RangeScaler, SCALER_VALUES[usize::from(factor)])
            .await?;
        let [offset] = (ptp_offset / i8::try_from(factor).unwrap_or(1)).to_be_bytes();
        self.write_byte(Register::SysrangePartToPartRangeOffset, offset)
            .await?;
        self.write_byte(
            Register::SysrangeCrosstalkValidHeight,
            DEFAULT_CROSSTALK_VALID_HEIGHT / factor,
        )
        .await?;

        // early convergence estimate only holds at 1x
        let enables = self
            .read_byte(Register::SysrangeRangeCheckEnables)
            .await?;
        let early_convergence = if factor == 1 {
            RANGE_CHECK_EARLY_CONVERGENCE
        } else {
            0
        };
        self.write_byte(
            Register::SysrangeRangeCheckEnables,
            (enables & !RANGE_CHECK_EARLY_CONVERGENCE) | early_convergence,
        )
        .await?;

        self.scaling = factor;
        debug!("Range scaling set to {}x", factor);
        Ok(())
    }
}
