//! VL6180X register map and the bit fields the driver touches.

/// Register addresses for the VL6180X sensor.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Identification model ID register (0x000), reads 0xB4
    IdentificationModelId = 0x000,
    /// GPIO1 mode register (0x011)
    SystemModeGpio1 = 0x011,
    /// Interrupt source configuration register (0x014)
    SystemInterruptConfigGpio = 0x014,
    /// Interrupt clear register (0x015)
    SystemInterruptClear = 0x015,
    /// Fresh out of reset flag (0x016)
    SystemFreshOutOfReset = 0x016,
    /// Range start register (0x018)
    SysrangeStart = 0x018,
    /// Range inter-measurement period register (0x01B)
    SysrangeIntermeasurementPeriod = 0x01B,
    /// Cross-talk valid height register (0x021)
    SysrangeCrosstalkValidHeight = 0x021,
    /// Part-to-part range offset register (0x024)
    SysrangePartToPartRangeOffset = 0x024,
    /// Range check enables register (0x02D)
    SysrangeRangeCheckEnables = 0x02D,
    /// VHV recalibrate register (0x02E)
    SysrangeVhvRecalibrate = 0x02E,
    /// VHV repeat rate register (0x031)
    SysrangeVhvRepeatRate = 0x031,
    /// ALS start register (0x038)
    SysalsStart = 0x038,
    /// ALS inter-measurement period register (0x03E)
    SysalsIntermeasurementPeriod = 0x03E,
    /// ALS analogue gain register (0x03F)
    SysalsAnalogueGain = 0x03F,
    /// ALS integration period, high byte (0x040)
    SysalsIntegrationPeriodHi = 0x040,
    /// ALS integration period, low byte (0x041)
    SysalsIntegrationPeriodLo = 0x041,
    /// Range status register (0x04D)
    ResultRangeStatus = 0x04D,
    /// Interrupt status register (0x04F)
    ResultInterruptStatusGpio = 0x04F,
    /// ALS result register, 16-bit (0x050)
    ResultAlsVal = 0x050,
    /// Range result register (0x062)
    ResultRangeVal = 0x062,
    /// Range scaler, 16-bit (0x096)
    RangeScaler = 0x096,
    /// Readout averaging sample period register (0x10A)
    ReadoutAveragingSamplePeriod = 0x10A,
    /// I2C slave device address register (0x212)
    I2cSlaveDeviceAddress = 0x212,
}

impl From<Register> for u16 {
    fn from(r: Register) -> Self {
        r as u16
    }
}

/// Value of [`Register::IdentificationModelId`] on a genuine VL6180X.
pub const MODEL_ID: u8 = 0xB4;

/// Default 7-bit bus address.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// `RESULT__RANGE_STATUS` bit 0: device ready for a new measurement.
pub const RANGE_STATUS_DEVICE_READY: u8 = 0x01;
/// `RESULT__RANGE_STATUS` bits 7:4: error code of the last measurement.
pub const RANGE_STATUS_ERROR_MASK: u8 = 0xF0;
/// Shift of the error code within `RESULT__RANGE_STATUS`.
pub const RANGE_STATUS_ERROR_SHIFT: u8 = 4;

/// `RESULT__INTERRUPT_STATUS_GPIO` / `SYSTEM__INTERRUPT_CONFIG_GPIO` bits 2:0, range source.
pub const INTERRUPT_RANGE_MASK: u8 = 0x07;
/// `RESULT__INTERRUPT_STATUS_GPIO` / `SYSTEM__INTERRUPT_CONFIG_GPIO` bits 5:3, ALS source.
pub const INTERRUPT_ALS_MASK: u8 = 0x38;
/// Shift of the ALS field within the interrupt registers.
pub const INTERRUPT_ALS_SHIFT: u8 = 3;
/// Interrupt status code for "new sample ready".
pub const INTERRUPT_NEW_SAMPLE_READY: u8 = 0x04;

/// `SYSTEM__INTERRUPT_CLEAR` bit for the range interrupt.
pub const CLEAR_RANGE: u8 = 0x01;
/// `SYSTEM__INTERRUPT_CLEAR` bit for the ALS interrupt.
pub const CLEAR_ALS: u8 = 0x02;
/// `SYSTEM__INTERRUPT_CLEAR` bit for the error interrupt.
pub const CLEAR_ERROR: u8 = 0x04;
/// All three interrupt sources.
pub const CLEAR_ALL: u8 = CLEAR_RANGE | CLEAR_ALS | CLEAR_ERROR;

/// Value written to `SYSRANGE__START` / `SYSALS__START` for a single-shot measurement.
pub const START_SINGLE_SHOT: u8 = 0x01;

/// `SYSRANGE__RANGE_CHECK_ENABLES` bit 0: early convergence estimate.
pub const RANGE_CHECK_EARLY_CONVERGENCE: u8 = 0x01;

/// Extracts the range field (bits 2:0) of an interrupt register.
#[must_use]
pub const fn range_interrupt_field(value: u8) -> u8 {
    value & INTERRUPT_RANGE_MASK
}

/// Extracts the ALS field (bits 5:3) of an interrupt register.
#[must_use]
pub const fn als_interrupt_field(value: u8) -> u8 {
    (value & INTERRUPT_ALS_MASK) >> INTERRUPT_ALS_SHIFT
}

/// Extracts the error code (bits 7:4) of `RESULT__RANGE_STATUS`.
#[must_use]
pub const fn range_error_code(value: u8) -> u8 {
    (value & RANGE_STATUS_ERROR_MASK) >> RANGE_STATUS_ERROR_SHIFT
}
