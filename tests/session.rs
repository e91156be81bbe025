#![cfg(not(feature = "async"))]

mod common;

use std::time::{Duration, Instant};

use common::{Recorder, Seen, SimulatedVl6180x, StdDelay};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::delay::NoopDelay;
use vl6180x::{
    AlsGain, Error, RangeState, RangeStatus, SessionState, SharedVl6180x, Vl6180x,
    PRIVATE_TUNING, PUBLIC_DEFAULTS,
};

fn configured(sim: SimulatedVl6180x) -> Vl6180x<SimulatedVl6180x, NoopDelay> {
    let mut sensor = Vl6180x::new(sim, NoopDelay);
    sensor.configure().unwrap();
    sensor
}

#[test]
fn configure_writes_tuning_then_public_defaults() {
    let mut sensor = Vl6180x::new(SimulatedVl6180x::new(), NoopDelay);
    sensor.configure().unwrap();
    assert_eq!(sensor.state(), SessionState::Configured);
    assert_eq!(sensor.scaling(), 1);

    let (sim, _) = sensor.close();
    let expected: Vec<(u16, u8)> = PRIVATE_TUNING
        .iter()
        .chain(PUBLIC_DEFAULTS.iter())
        .copied()
        .chain([(0x016, 0x00)])
        .collect();
    assert_eq!(&sim.writes[..expected.len()], &expected[..]);
    assert_eq!(sim.register(0x016), 0x00);
    assert_eq!(sim.register(0x014), 0x24);
    // left at 1x scaling
    assert_eq!(sim.register_word(0x096), 253);
    assert_eq!(sim.register(0x024), 0x0C);
    assert_eq!(sim.register(0x021), 20);
    assert_eq!(sim.register(0x02D) & 0x01, 0x01);
}

#[test]
fn configure_rejects_other_devices_without_writing() {
    let mut sensor = Vl6180x::new(SimulatedVl6180x::new().with_model_id(0x00), NoopDelay);

    assert_eq!(sensor.configure(), Err(Error::UnexpectedDeviceId(0x00)));
    assert_eq!(sensor.state(), SessionState::Rejected(0x00));

    // the session stays poisoned
    assert_eq!(sensor.read_range(), Err(Error::UnexpectedDeviceId(0x00)));
    assert_eq!(sensor.set_scaling(2), Err(Error::UnexpectedDeviceId(0x00)));
    assert_eq!(sensor.configure(), Err(Error::UnexpectedDeviceId(0x00)));

    let (sim, _) = sensor.close();
    assert!(sim.writes.is_empty());
}

#[test]
fn configure_twice_matches_configure_once() {
    let (once, _) = configured(SimulatedVl6180x::new()).close();

    let mut sensor = configured(SimulatedVl6180x::new());
    sensor.configure().unwrap();
    let (twice, _) = sensor.close();

    assert_eq!(once.registers, twice.registers);
}

#[test]
fn configure_restores_unit_scaling() {
    let mut sensor = configured(SimulatedVl6180x::new());
    sensor.set_scaling(3).unwrap();
    sensor.configure().unwrap();
    assert_eq!(sensor.scaling(), 1);

    let (sim, _) = sensor.close();
    let (fresh, _) = configured(SimulatedVl6180x::new()).close();
    assert_eq!(sim.registers, fresh.registers);
}

#[test]
fn negative_part_to_part_offset_survives_scaling() {
    let mut sim = SimulatedVl6180x::new();
    // -6 mm
    sim.registers[0x024] = 0xFA;
    let sensor = configured(sim);

    let offset = |sensor: Vl6180x<SimulatedVl6180x, NoopDelay>| {
        let (sim, delay) = sensor.close();
        let offset = i8::from_be_bytes([sim.register(0x024)]);
        (offset, Vl6180x::new(sim, delay))
    };

    let (at_1x, mut sensor) = offset(sensor);
    assert_eq!(at_1x, -6);

    // a fresh session captures the offset again, from a device left at 1x
    sensor.configure().unwrap();
    sensor.set_scaling(2).unwrap();
    let (at_2x, mut sensor) = offset(sensor);
    assert_eq!(at_2x, -3);

    // this session finds the device at 2x and scales the stored offset back up
    sensor.set_scaling(3).unwrap();
    let (at_3x, mut sensor) = offset(sensor);
    assert_eq!(at_3x, -2);

    sensor.configure().unwrap();
    let (restored, _) = offset(sensor);
    assert_eq!(restored, -6);
}

#[test]
fn range_reads_raw_distance_and_clears_interrupts() {
    let mut sim = SimulatedVl6180x::new();
    sim.range_mm = 0x64;
    let mut sensor = configured(sim);

    let reading = sensor.read_range().unwrap();
    assert_eq!(reading.distance_mm, 100);
    assert_eq!(reading.status, RangeStatus::NoError);

    let (sim, _) = sensor.close();
    assert_eq!(sim.writes.last(), Some(&(0x015, 0x07)));
    assert_eq!(sim.register(0x04F) & 0x07, 0);
}

#[test]
fn range_fault_is_returned_and_cleared() {
    let mut sim = SimulatedVl6180x::new();
    sim.range_mm = 0xFF;
    sim.range_error = 7;
    let mut sensor = configured(sim);

    let reading = sensor.read_range().unwrap();
    assert_eq!(reading.status, RangeStatus::NoConvergence);
    assert!(!reading.is_valid());

    // the next cycle is not disturbed by the faulty one
    sensor.read_range().unwrap();
    let (sim, _) = sensor.close();
    assert_eq!(sim.triggered_while_pending, 0);
    assert_eq!(sim.writes.last(), Some(&(0x015, 0x07)));
}

#[test]
fn range_after_each_scaling_checks_ready_bit_first() {
    let mut sim = SimulatedVl6180x::new();
    sim.range_mm = 80;
    let mut sensor = configured(sim).with_observer(Recorder::default());

    for factor in 1..=3u8 {
        sensor.observer_mut().seen.clear();
        sensor.set_scaling(factor).unwrap();
        let reading = sensor.read_range().unwrap();

        assert_eq!(reading.distance_mm, 80);
        assert_eq!(reading.scaling, factor);
        assert_eq!(reading.scaled_distance_mm(), 80 * u16::from(factor));

        let seen = &sensor.observer().seen;
        let idle = seen
            .iter()
            .position(|s| *s == Seen::Range(RangeState::Idle))
            .unwrap();
        let ready_check = seen
            .iter()
            .skip(idle)
            .position(|s| *s == Seen::Read(0x04D))
            .unwrap()
            + idle;
        let trigger = seen.iter().position(|s| *s == Seen::Write(0x018)).unwrap();
        assert!(idle < ready_check && ready_check < trigger);
    }

    let (sim, _) = sensor.close();
    assert_eq!(sim.triggered_while_pending, 0);
    assert_eq!(sim.range_triggers, 3);
    // 3x: scaler 84, offset 12 / 3, cross-talk height 20 / 3, early convergence off
    assert_eq!(sim.register_word(0x096), 84);
    assert_eq!(sim.register(0x024), 4);
    assert_eq!(sim.register(0x021), 6);
    assert_eq!(sim.register(0x02D) & 0x01, 0);
}

#[test]
fn range_state_machine_order() {
    let mut sensor = configured(SimulatedVl6180x::new()).with_observer(Recorder::default());
    sensor.read_range().unwrap();

    let states: Vec<Seen> = sensor
        .observer()
        .seen
        .iter()
        .copied()
        .filter(|s| matches!(s, Seen::Range(_)))
        .collect();
    assert_eq!(
        states,
        [
            Seen::Range(RangeState::Idle),
            Seen::Range(RangeState::Triggered),
            Seen::Range(RangeState::Polling),
            Seen::Range(RangeState::ResultReady),
            Seen::Range(RangeState::Cleared),
        ]
    );
}

#[test]
fn never_ready_device_times_out() {
    let sim = SimulatedVl6180x::new().never_ready();
    let mut sensor = Vl6180x::new(sim, StdDelay);
    sensor.set_timeout_ms(50);

    let started = Instant::now();
    assert_eq!(sensor.read_range(), Err(Error::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed.as_millis() < 100, "took {elapsed:?}");

    let (sim, _) = sensor.close();
    // the measurement was never started
    assert_eq!(sim.range_triggers, 0);
}

#[test]
fn lux_gain_above_maximum_is_clamped() {
    let mut sim = SimulatedVl6180x::new();
    sim.als_count = 1000;
    let mut sensor = configured(sim);

    let reading = sensor.read_lux(0x09u8).unwrap();
    assert_eq!(reading.gain, AlsGain::Gain40);
    assert_eq!(reading.raw, 1000);
    assert!((reading.lux - 8.0).abs() < 1e-3);

    let (sim, _) = sensor.close();
    assert_eq!(sim.register(0x03F), 0x47);
    assert_eq!(sim.register_word(0x040), 100);
    assert!(sim
        .writes
        .iter()
        .filter(|(register, _)| *register == 0x03F)
        .all(|&(_, value)| value & 0x0F <= 0x07));
}

#[test]
fn lux_then_range() {
    let mut sim = SimulatedVl6180x::new();
    sim.als_count = 320;
    sim.range_mm = 42;
    let mut sensor = configured(sim);

    let light = sensor.read_lux(AlsGain::Gain1).unwrap();
    assert!((light.lux - 102.4).abs() < 1e-3);
    assert_eq!(sensor.read_range().unwrap().distance_mm, 42);
    let light = sensor.read_lux(AlsGain::Gain10).unwrap();
    assert!((light.lux - 10.24).abs() < 1e-3);

    let (sim, _) = sensor.close();
    assert_eq!(sim.register(0x04F), 0);
}

#[test]
fn transport_error_aborts_but_session_survives() {
    let mut sensor = configured(SimulatedVl6180x::new());
    let (mut sim, delay) = sensor.close();
    sim.fail_next = true;
    sensor = Vl6180x::new(sim, delay);

    let error = sensor.read_range().unwrap_err();
    assert_eq!(error, Error::I2cError(ErrorKind::Bus));
    assert_eq!(error.transport_kind(), Some(ErrorKind::Bus));

    assert!(sensor.read_range().unwrap().is_valid());
}

#[test]
fn missing_device_is_a_transport_error() {
    let mut sensor = Vl6180x::with_address(SimulatedVl6180x::new(), NoopDelay, 0x30).unwrap();
    assert!(matches!(
        sensor.configure(),
        Err(Error::I2cError(ErrorKind::NoAcknowledge(_)))
    ));
    assert_eq!(sensor.state(), SessionState::Unconfigured);
}

#[test]
fn shared_sensor_serializes_measurement_cycles() {
    let mut sim = SimulatedVl6180x::new();
    sim.range_mm = 55;
    let shared: SharedVl6180x<CriticalSectionRawMutex, _, _> =
        SharedVl6180x::new(Vl6180x::new(sim, NoopDelay));
    shared.configure().unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4u8 {
            let shared = &shared;
            scope.spawn(move || {
                for i in 0..25 {
                    if i % 10 == 0 {
                        shared.set_scaling(1 + worker % 3).unwrap();
                    }
                    assert_eq!(shared.read_range().unwrap().distance_mm, 55);
                }
            });
        }
    });

    let (sim, _) = shared.close().unwrap().close();
    assert_eq!(sim.range_triggers, 100);
    assert_eq!(sim.triggered_while_pending, 0);
    assert!(matches!(shared.read_range(), Err(Error::UseAfterClose)));
}

#[test]
fn shared_sensors_on_separate_buses_do_not_wait_for_each_other() {
    let mut stuck = Vl6180x::new(SimulatedVl6180x::new().never_ready(), StdDelay);
    stuck.set_timeout_ms(300);
    let stuck: SharedVl6180x<CriticalSectionRawMutex, _, _> = SharedVl6180x::new(stuck);
    let healthy: SharedVl6180x<CriticalSectionRawMutex, _, _> =
        SharedVl6180x::new(Vl6180x::new(SimulatedVl6180x::new(), NoopDelay));

    std::thread::scope(|scope| {
        let polling = scope.spawn(|| stuck.read_range());
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(healthy.read_range().unwrap().is_valid());
        let elapsed = started.elapsed();
        assert!(elapsed.as_millis() < 100, "took {elapsed:?}");

        assert_eq!(polling.join().unwrap(), Err(Error::Timeout));
    });
}
