//! A register-level VL6180X stand-in for host tests.
#![allow(dead_code)]

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use vl6180x::{AlsState, Event, Observer, RangeState};

const REGISTER_SPACE: usize = 0x400;

/// Simulated sensor: a flat register file plus just enough behaviour to complete
/// single-shot range and ALS measurements.
pub struct SimulatedVl6180x {
    pub address: u8,
    pub registers: Vec<u8>,
    /// Every byte written, in bus order, as (register, value)
    pub writes: Vec<(u16, u8)>,
    /// Distance reported by the next range measurement
    pub range_mm: u8,
    /// Error code (bits 7:4 of the range status) reported by the next range measurement
    pub range_error: u8,
    /// Count reported by the next ALS measurement
    pub als_count: u16,
    /// Keep the device-ready bit low forever
    pub never_ready: bool,
    /// Fail the next transfer with a bus error
    pub fail_next: bool,
    /// Range starts issued while a previous result was still latched
    pub triggered_while_pending: usize,
    pub range_triggers: usize,
    range_pending: bool,
    pointer: u16,
}

impl SimulatedVl6180x {
    pub fn new() -> Self {
        let mut registers = vec![0u8; REGISTER_SPACE];
        registers[0x000] = 0xB4;
        registers[0x016] = 0x01;
        registers[0x024] = 0x0C;
        registers[0x02D] = 0x11;
        registers[0x04D] = 0x01;
        registers[0x096] = 0x00;
        registers[0x097] = 0xFD;
        Self {
            address: 0x29,
            registers,
            writes: Vec::new(),
            range_mm: 0,
            range_error: 0,
            als_count: 0,
            never_ready: false,
            fail_next: false,
            triggered_while_pending: 0,
            range_triggers: 0,
            range_pending: false,
            pointer: 0,
        }
    }

    pub fn with_model_id(mut self, model_id: u8) -> Self {
        self.registers[0x000] = model_id;
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self.registers[0x04D] &= !0x01;
        self
    }

    pub fn register(&self, register: u16) -> u8 {
        self.registers[usize::from(register)]
    }

    pub fn register_word(&self, register: u16) -> u16 {
        u16::from_be_bytes([self.register(register), self.register(register + 1)])
    }

    fn ready_bit(&self) -> u8 {
        u8::from(!self.never_ready)
    }

    fn store(&mut self, register: u16, value: u8) {
        self.writes.push((register, value));
        self.registers[usize::from(register)] = value;

        match register {
            0x018 if value & 0x01 != 0 => {
                if self.range_pending {
                    self.triggered_while_pending += 1;
                }
                self.range_pending = true;
                self.range_triggers += 1;
                self.registers[0x062] = self.range_mm;
                self.registers[0x04D] = (self.range_error << 4) | self.ready_bit();
                self.registers[0x04F] = (self.registers[0x04F] & !0x07) | 0x04;
            }
            0x038 if value & 0x01 != 0 => {
                let [hi, lo] = self.als_count.to_be_bytes();
                self.registers[0x050] = hi;
                self.registers[0x051] = lo;
                self.registers[0x04F] = (self.registers[0x04F] & !0x38) | 0x20;
            }
            0x015 => {
                if value & 0x01 != 0 {
                    self.registers[0x04F] &= !0x07;
                    self.range_pending = false;
                }
                if value & 0x02 != 0 {
                    self.registers[0x04F] &= !0x38;
                }
                if value & 0x04 != 0 {
                    self.registers[0x04F] &= !0xC0;
                }
            }
            0x212 => self.address = value,
            _ => {}
        }
    }

    fn handle_write(&mut self, bytes: &[u8]) {
        if bytes.len() < 2 {
            return;
        }
        self.pointer = u16::from_be_bytes([bytes[0], bytes[1]]);
        for &value in &bytes[2..] {
            self.store(self.pointer, value);
            self.pointer += 1;
        }
    }
}

impl ErrorType for SimulatedVl6180x {
    type Error = ErrorKind;
}

impl I2c for SimulatedVl6180x {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_next {
            self.fail_next = false;
            return Err(ErrorKind::Bus);
        }
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.handle_write(bytes),
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[usize::from(self.pointer)];
                        self.pointer += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Blocking delay backed by `std::thread::sleep`.
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// What a [`Recorder`] saw, without the borrowed payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    Write(u16),
    Read(u16),
    Range(RangeState),
    Als(AlsState),
}

/// Observer keeping every event in order.
#[derive(Default)]
pub struct Recorder {
    pub seen: Vec<Seen>,
}

impl Observer for Recorder {
    fn on_event(&mut self, event: &Event<'_>) {
        let seen = match *event {
            Event::Write { register, .. } => Seen::Write(register),
            Event::Read { register, .. } => Seen::Read(register),
            Event::Range(state) => Seen::Range(state),
            Event::Als(state) => Seen::Als(state),
        };
        self.seen.push(seen);
    }
}
