//! Protocol events and the observers that receive them.

use crate::measurement::{AlsState, RangeState};

/// Something the driver did on the bus or in one of its state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event<'a> {
    /// Bytes about to be written starting at `register`
    Write {
        /// First register address
        register: u16,
        /// Payload, without the address bytes
        data: &'a [u8],
    },
    /// Bytes read back starting at `register`
    Read {
        /// First register address
        register: u16,
        /// Bytes returned by the device
        data: &'a [u8],
    },
    /// The range state machine entered a new state
    Range(RangeState),
    /// The ALS state machine entered a new state
    Als(AlsState),
}

/// Receives [`Event`]s as the driver talks to the sensor.
///
/// Implementations must not block; they run inline with the bus transfers.
pub trait Observer {
    /// Called for every register transfer and state transition.
    fn on_event(&mut self, event: &Event<'_>);
}

/// Discards every event.
impl Observer for () {
    fn on_event(&mut self, _event: &Event<'_>) {}
}

/// Forwards events to `log` or `defmt`, whichever feature is enabled.
///
/// Register traffic is logged at trace level, state transitions at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&mut self, event: &Event<'_>) {
        match *event {
            Event::Write { register, data } => {
                trace!("write {:#x} <- {:?}", register, data);
            }
            Event::Read { register, data } => {
                trace!("read {:#x} -> {:?}", register, data);
            }
            Event::Range(state) => debug!("range: {:?}", state),
            Event::Als(state) => debug!("als: {:?}", state),
        }
    }
}

impl<T: Observer + ?Sized> Observer for &mut T {
    fn on_event(&mut self, event: &Event<'_>) {
        (**self).on_event(event);
    }
}
