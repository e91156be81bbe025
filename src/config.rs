//! Device bring-up: the register sequences from the application note and the
//! configuration operation that replays them.

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::measurement::scaling_for_scaler;
use crate::register::{Register, MODEL_ID};
use crate::{Error, Observer, SessionState, Vl6180x};

/// Mandatory private register settings from the VL6180X application note (AN4545,
/// "SR03 settings"). Order matters and must be replayed exactly.
pub const PRIVATE_TUNING: [(u16, u8); 30] = [
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xfd),
    (0x00e3, 0x00),
    (0x00e4, 0x04),
    (0x00e5, 0x02),
    (0x00e6, 0x01),
    (0x00e7, 0x03),
    (0x00f5, 0x02),
    (0x00d9, 0x05),
    (0x00db, 0xce),
    (0x00dc, 0x03),
    (0x00dd, 0xf8),
    (0x009f, 0x00),
    (0x00a3, 0x3c),
    (0x00b7, 0x00),
    (0x00bb, 0x3c),
    (0x00b2, 0x09),
    (0x00ca, 0x09),
    (0x0198, 0x01),
    (0x01b0, 0x17),
    (0x01ad, 0x00),
    (0x00ff, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01a6, 0x1b),
    (0x01ac, 0x3e),
    (0x01a7, 0x1f),
    (0x0030, 0x00),
];

/// Recommended public register settings, applied after [`PRIVATE_TUNING`].
pub const PUBLIC_DEFAULTS: [(u16, u8); 9] = [
    // poll for "new sample ready" when a measurement completes
    (Register::SystemModeGpio1 as u16, 0x10),
    // averaging sample period, trades noise for execution time
    (Register::ReadoutAveragingSamplePeriod as u16, 0x30),
    // light and dark gain (upper nibble); dark gain must stay at 4
    (Register::SysalsAnalogueGain as u16, 0x46),
    // range measurements between automatic calibrations
    (Register::SysrangeVhvRepeatRate as u16, 0xFF),
    // ALS integration time 100 ms
    (Register::SysalsIntegrationPeriodHi as u16, 0x63),
    // one-shot temperature calibration of the ranging sensor
    (Register::SysrangeVhvRecalibrate as u16, 0x01),
    // range inter-measurement period 100 ms
    (Register::SysrangeIntermeasurementPeriod as u16, 0x09),
    // ALS inter-measurement period 500 ms
    (Register::SysalsIntermeasurementPeriod as u16, 0x31),
    // interrupt on "new sample ready" for both range and ALS
    (Register::SystemInterruptConfigGpio as u16, 0x24),
];

/// Default deadline for every status poll.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Lux per ALS count at 1x gain and 100 ms integration, from the datasheet.
pub const DEFAULT_LUX_RESOLUTION: f32 = 0.32;

/// Driver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Deadline, in milliseconds, for every status poll
    pub timeout_ms: u32,
    /// Lux per ALS count at 1x gain and 100 ms integration
    pub lux_resolution: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            lux_resolution: DEFAULT_LUX_RESOLUTION,
        }
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
    /// Verifies the device and loads its settings.
    ///
    /// Reads the model ID, then writes [`PRIVATE_TUNING`] followed by [`PUBLIC_DEFAULTS`],
    /// clears the fresh-out-of-reset flag and restores 1x range scaling. Running it again
    /// reapplies the same values.
    ///
    /// **Important**: a wrong model ID is fatal for the session. Nothing is written and
    /// every later call fails with the same error.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UnexpectedDeviceId(id))` - If the device is not a VL6180X
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error; the device
    ///   state is then unknown and `configure` should be retried
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
    /// assert_eq!(sensor.scaling(), 1);
    /// ```
    pub async fn configure(&mut self) -> Result<(), Error<E>> {
        self.ensure_usable()?;

        let model_id = self.read_byte(Register::IdentificationModelId).await?;
        if model_id != MODEL_ID {
            error!("Unexpected model id {:#x}, expected {:#x}", model_id, MODEL_ID);
            self.state = SessionState::Rejected(model_id);
            return Err(Error::UnexpectedDeviceId(model_id));
        }

        // Must be captured before the tuning block rewrites the range scaler.
        self.part_to_part_offset().await?;

        info!("Loading private tuning settings");
        self.write_sequence(&PRIVATE_TUNING).await?;
        info!("Loading public register defaults");
        self.write_sequence(&PUBLIC_DEFAULTS).await?;
        self.write_byte(Register::SystemFreshOutOfReset, 0x00)
            .await?;

        self.apply_scaling(1).await?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Replays an ordered list of `(register, value)` writes.
    ///
    /// Writes are issued one at a time, in order; the first failure aborts the rest.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn write_sequence(&mut self, sequence: &[(u16, u8)]) -> Result<(), Error<E>> {
        for &(register, value) in sequence {
            self.write_byte(register, value).await?;
        }
        Ok(())
    }

    /// Part-to-part range offset at 1x scaling, in signed millimeters.
    ///
    /// Read once from the device and cached. If the device is already running at 2x or 3x
    /// (a previous session scaled it), the stored value is scaled back up.
    pub(crate) async fn part_to_part_offset(&mut self) -> Result<i8, Error<E>> {
        if let Some(offset) = self.ptp_offset {
            return Ok(offset);
        }
        // two's complement on the device
        let raw = self
            .read_byte(Register::SysrangePartToPartRangeOffset)
            .await?;
        let scaler = self.read_word(Register::RangeScaler).await?;
        let offset = i8::from_be_bytes([raw]).saturating_mul(scaling_for_scaler(scaler));
        debug!("Part-to-part range offset: {}", offset);
        self.ptp_offset = Some(offset);
        Ok(offset)
    }
}
