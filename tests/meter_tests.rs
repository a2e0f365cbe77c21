//! End-to-end tests of the tick loop over an in-memory transport: handshake,
//! polling, publication, timeouts and recovery.


use mbus_heatmeter::constants::STATUS_NO_READOUT;
use mbus_heatmeter::mbus::frame::pack_frame;
use mbus_heatmeter::mbus::handshake::{init_request, poll_request, InitState};
use mbus_heatmeter::{Channel, MBusError, Meter, MeterConfig, MockTransport};
use mock_support::*;
use std::collections::BTreeSet;
use std::io;
use std::time::{Duration, Instant};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Meter in the steady state with a poll request outstanding.
fn polling_meter(config: MeterConfig) -> (Meter, MockTransport, RecordingSink, Instant) {
    let mut meter = Meter::new(config).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let now = complete_handshake(&mut meter, &mut transport, &mut sink, Instant::now());

    meter.trigger();
    let report = meter.tick(now, &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, Some(InitState::Steady));
    assert_eq!(transport.take_tx_data(), poll_request(false).to_vec());
    (meter, transport, sink, now)
}

/// Tests that the handshake requests go out in order, one per acknowledgment.
#[test]
fn test_handshake_over_transport() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    // Nothing happens until the poll timer fires
    let report = meter.tick(start, &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, None);

    complete_handshake(&mut meter, &mut transport, &mut sink, start);
    assert!(sink.events.is_empty());

    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut expected = Vec::new();
    for step in [
        InitState::Step1,
        InitState::Step2,
        InitState::Step3,
        InitState::Step4,
        InitState::Step5,
    ] {
        expected.extend_from_slice(&init_request(step).unwrap());
    }
    let mut transport = MockTransport::new();
    meter.trigger();
    meter.tick(start, &mut transport, &mut sink, None).unwrap();
    for i in 1..=5u32 {
        transport.queue_ack();
        meter.tick(start + ms(20) * (i - 1), &mut transport, &mut sink, None).unwrap();
        meter.tick(start + ms(20) * i, &mut transport, &mut sink, None).unwrap();
    }
    assert_eq!(transport.get_tx_data(), expected.as_slice());
    // The last flush precedes the switch to the steady state, which sends nothing
    assert_eq!(transport.flushes, 6);
}

/// Tests that the init gap is respected before the next step is sent.
#[test]
fn test_init_gap() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    meter.trigger();
    meter.tick(start, &mut transport, &mut sink, None).unwrap();
    transport.queue_ack();
    let report = meter.tick(start + ms(5), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.acknowledgments, 1);
    assert_eq!(report.sent, None);

    let report = meter.tick(start + ms(24), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, None);
    let report = meter.tick(start + ms(25), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, Some(InitState::Step2));
}

/// Tests that a valid frame counts as acknowledgment during initialization.
#[test]
fn test_frame_acknowledges_init_step() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    meter.trigger();
    meter.tick(start, &mut transport, &mut sink, None).unwrap();
    transport.queue_rx_data(&pack_frame(0x08, 0x01, 0x72, &[0x00, 0x00]));
    let report = meter.tick(start + ms(30), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.acknowledgments, 1);
    assert_eq!(report.telegrams, 0);

    let report = meter.tick(start + ms(50), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, Some(InitState::Step2));
    assert!(sink.events.is_empty());
}

/// Tests that an intact frame without C/A/CI fields acknowledges an init step.
#[test]
fn test_headerless_frame_acknowledges_init_step() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    meter.trigger();
    meter.tick(start, &mut transport, &mut sink, None).unwrap();
    transport.queue_rx_data(&[0x68, 0x00, 0x00, 0x68, 0x00, 0x16]);
    let report = meter.tick(start + ms(30), &mut transport, &mut sink, None).unwrap();

    assert_eq!(report.acknowledgments, 1);
    assert_eq!(report.errors, 0);
    assert!(sink.events.is_empty());
    let report = meter.tick(start + ms(50), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, Some(InitState::Step2));
}

/// Tests that a frame without C/A/CI fields is rejected once polling.
#[test]
fn test_headerless_frame_rejected_when_polling() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    transport.queue_rx_data(&[0x68, 0x00, 0x00, 0x68, 0x00, 0x16]);
    let report = meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();

    assert_eq!(report.acknowledgments, 0);
    assert_eq!(report.errors, 1);
    assert_eq!(sink.statuses(), vec![STATUS_NO_READOUT.to_string()]);
}

/// Tests that a telegram with one energy record publishes 1.234 kWh.
#[test]
fn test_energy_telegram_end_to_end() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());
    let mut indicator = RecordingIndicator::default();

    transport.queue_rx_data(&data_telegram(&ENERGY_RECORD));
    let report = meter
        .tick(now + ms(50), &mut transport, &mut sink, Some(&mut indicator))
        .unwrap();

    assert_eq!(report.telegrams, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(sink.values(Channel::Energy), vec![1.234]);
    assert!(sink.last(Channel::CalculatedPower).unwrap().is_nan());
    assert!(indicator.is_on());
}

/// Tests that the indicator turns off after its pulse.
#[test]
fn test_indicator_pulse() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());
    let mut indicator = RecordingIndicator::default();

    transport.queue_rx_data(&data_telegram(&ENERGY_RECORD));
    meter.tick(now, &mut transport, &mut sink, Some(&mut indicator)).unwrap();
    meter.tick(now + ms(199), &mut transport, &mut sink, Some(&mut indicator)).unwrap();
    assert_eq!(indicator.changes, vec![true]);

    meter.tick(now + ms(200), &mut transport, &mut sink, Some(&mut indicator)).unwrap();
    assert_eq!(indicator.changes, vec![true, false]);
}

/// Tests derived and status outputs of a telegram.
#[test]
fn test_calculated_power_and_status() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    let mut records = FLOW_RECORD.to_vec();
    records.extend_from_slice(&TDIFF_RECORD);
    records.extend_from_slice(&STATUS_RECORD);
    transport.queue_rx_data(&data_telegram(&records));
    meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();

    assert_eq!(sink.values(Channel::Flow), vec![2.0]);
    assert_eq!(sink.values(Channel::TemperatureDifference), vec![5.0]);
    let power = sink.last(Channel::CalculatedPower).unwrap();
    assert!((power - 11647.222).abs() < 0.001);
    assert_eq!(
        sink.statuses(),
        vec!["Temperature Sensor 1: Cable Break | Low Battery".to_string()]
    );
}

/// Tests that silence after a request leads to the "no data" sentinel.
#[test]
fn test_receive_timeout() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    transport.queue_rx_data(&[0x68, 0x35]);
    meter.tick(now + ms(1), &mut transport, &mut sink, None).unwrap();
    assert_eq!(meter.state().sync.buffered(), &[0x68, 0x35]);

    let report = meter.tick(now + ms(500), &mut transport, &mut sink, None).unwrap();
    assert!(!report.timed_out);

    let report = meter.tick(now + ms(501), &mut transport, &mut sink, None).unwrap();
    assert!(report.timed_out);
    assert!(meter.state().sync.buffered().is_empty());
    assert!(!meter.state().sync.is_receiving());
    assert_eq!(sink.statuses(), vec![STATUS_NO_READOUT.to_string()]);
    for channel in Channel::numeric() {
        let values = sink.values(channel);
        assert_eq!(values.len(), 1, "{channel}");
        assert!(values[0].is_nan(), "{channel}");
    }
    // Steady state waits for the poll timer
    assert_eq!(report.sent, None);
}

/// Tests that the timeout includes the wire time of the request.
#[test]
fn test_timeout_includes_wire_time() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(MeterConfig::default());

    // 23 bytes at 2400 baud take 105 ms
    let report = meter.tick(now + ms(604), &mut transport, &mut sink, None).unwrap();
    assert!(!report.timed_out);
    let report = meter.tick(now + ms(605), &mut transport, &mut sink, None).unwrap();
    assert!(report.timed_out);
}

/// Tests that a timeout during initialization resends the step.
#[test]
fn test_init_timeout_resends() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    meter.trigger();
    meter.tick(start, &mut transport, &mut sink, None).unwrap();
    let step1 = transport.take_tx_data();

    let report = meter.tick(start + ms(500), &mut transport, &mut sink, None).unwrap();
    assert!(report.timed_out);
    assert_eq!(report.sent, Some(InitState::Step1));
    assert_eq!(transport.take_tx_data(), step1);
}

/// Tests that a poll trigger waits while a reply is outstanding.
#[test]
fn test_poll_waits_for_reply() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    meter.trigger();
    let report = meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.sent, None);
    assert!(meter.state().is_triggered());

    transport.queue_rx_data(&data_telegram(&ENERGY_RECORD));
    let report = meter.tick(now + ms(20), &mut transport, &mut sink, None).unwrap();
    assert_eq!(report.telegrams, 1);
    assert_eq!(report.sent, Some(InitState::Steady));
    assert_eq!(transport.take_tx_data(), poll_request(false).to_vec());
}

/// Tests that a corrupted telegram publishes the sentinel.
#[test]
fn test_bad_checksum_publishes_sentinel() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    let mut bytes = data_telegram(&ENERGY_RECORD);
    let index = bytes.len() - 2;
    bytes[index] ^= 0xFF;
    transport.queue_rx_data(&bytes);
    let report = meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.telegrams, 0);
    assert_eq!(sink.statuses(), vec![STATUS_NO_READOUT.to_string()]);
    assert!(sink.last(Channel::Energy).unwrap().is_nan());
}

/// Tests that a valid frame of another shape publishes the sentinel.
#[test]
fn test_unknown_telegram_publishes_sentinel() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    transport.queue_long_frame(0x08, 0x00, 0x78, &[0x00; 12]);
    let report = meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(sink.statuses(), vec![STATUS_NO_READOUT.to_string()]);
}

/// Tests that records before an unsupported entry are still published.
#[test]
fn test_partial_telegram_is_published() {
    let (mut meter, mut transport, mut sink, now) = polling_meter(fast_line_config());

    let mut records = ENERGY_RECORD.to_vec();
    records.extend_from_slice(&[0x04, 0x6D, 0x00, 0x00, 0x00, 0x00]);
    records.extend_from_slice(&FLOW_RECORD);
    transport.queue_rx_data(&data_telegram(&records));
    let report = meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();

    assert_eq!(report.telegrams, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(sink.values(Channel::Energy), vec![1.234]);
    assert!(sink.values(Channel::Flow).is_empty());
    assert!(sink.statuses().is_empty());
}

/// Tests that only enabled outputs are published.
#[test]
fn test_disabled_outputs_are_skipped() {
    let config = MeterConfig {
        outputs: BTreeSet::from([Channel::Energy]),
        ..fast_line_config()
    };
    let (mut meter, mut transport, mut sink, now) = polling_meter(config);

    let mut records = ENERGY_RECORD.to_vec();
    records.extend_from_slice(&FLOW_RECORD);
    records.extend_from_slice(&STATUS_RECORD);
    transport.queue_rx_data(&data_telegram(&records));
    meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();
    assert_eq!(sink.events, vec![Published::Value(Channel::Energy, 1.234)]);

    sink.clear();
    meter.trigger();
    meter.tick(now + ms(20), &mut transport, &mut sink, None).unwrap();
    meter.tick(now + ms(600), &mut transport, &mut sink, None).unwrap();
    assert_eq!(sink.events.len(), 1);
    assert!(sink.last(Channel::Energy).unwrap().is_nan());
}

/// Tests that integrated energy takes over publication with decimals set.
#[test]
fn test_energy_with_decimals() {
    let config = MeterConfig {
        energy_decimals: 3,
        ..fast_line_config()
    };
    let (mut meter, mut transport, mut sink, now) = polling_meter(config);

    transport.queue_rx_data(&data_telegram(&ENERGY_RECORD));
    meter.tick(now + ms(10), &mut transport, &mut sink, None).unwrap();
    assert_eq!(sink.values(Channel::Energy), vec![1.234]);
}

/// Tests that transport failures are returned to the caller.
#[test]
fn test_transport_error_is_returned() {
    let mut meter = Meter::new(fast_line_config()).unwrap();
    let mut transport = MockTransport::new();
    let mut sink = RecordingSink::new();

    transport.set_next_error(io::ErrorKind::BrokenPipe);
    let result = meter.tick(Instant::now(), &mut transport, &mut sink, None);
    assert!(matches!(result, Err(MBusError::Io(_))));
}

/// Tests that an invalid configuration is rejected.
#[test]
fn test_invalid_config_rejected() {
    let config = MeterConfig {
        baud_rate: 0,
        ..MeterConfig::default()
    };
    assert!(matches!(Meter::new(config), Err(MBusError::Config(_))));
}
