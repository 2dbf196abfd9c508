mod common;

use common::{hex, init_tracing, FakeDrive};
use lift_device::{
    open_lift, Error, ErrorCode, FramedChannel, LiftConfig, LiftDevice, MetricsHub, PowerState,
    TransportConfig, UartConfig, UartLift,
};
use lift_protocol::{od, AbortCode, CodecError};
use lift_transport::{ByteLink, MockLink, MockLinkHandle};

fn open_on(drive: &FakeDrive) -> (UartLift<MockLink>, MockLinkHandle) {
    init_tracing();
    let link = MockLink::open("/dev/ttyUSB0", 38_400)
        .unwrap()
        .with_responder(drive.clone().uart_responder());
    let handle = link.handle();
    let lift = UartLift::with_link(link, &UartConfig::new("/dev/ttyUSB0")).unwrap();
    (lift, handle)
}

#[test]
fn open_selects_position_mode_and_default_speed() {
    let drive = FakeDrive::new();
    let (lift, link) = open_on(&drive);
    let expected = [
        hex("7F 40 41 60 00 00 00 00 00 A0"),
        hex("7F 2B 40 60 00 86 00 00 00 30"),
        hex("7F2F6060000100000091"),
        hex("7F23816000039D3600A7"),
    ]
    .concat();
    assert_eq!(link.written(), expected);
    assert_eq!(lift.power_state(), PowerState::ReadyToSwitchOn);
    // three write echoes are still waiting in the stream
    assert_eq!(link.pending_rx(), 30);
}

#[test]
fn set_height_programs_and_latches() {
    let drive = FakeDrive::new();
    let (mut lift, link) = open_on(&drive);
    link.take_written();

    lift.set_height(0.5).unwrap();
    let expected = [
        hex("7F237A600000B036009E"),
        hex("7F2B4060002F00000087"),
        hex("7F2B4060003F00000077"),
    ]
    .concat();
    assert_eq!(link.written(), expected);
    assert_eq!(drive.get(od::POSITION_TARGET), Some(3_584_000));
    assert_eq!(lift.power_state(), PowerState::OperationEnabled);
}

#[test]
fn height_survives_garbage_and_echoes() {
    let drive = FakeDrive::new();
    let (mut lift, _link) = open_on(&drive);
    drive.set(od::POSITION_ACTUAL, 3_584_000);
    drive.lock().garbage_prefix = vec![0x00, 0x7F, 0x11, 0x7F];

    assert_eq!(lift.get_height().unwrap(), 0.5);
    assert_eq!(lift.get_column_heights().unwrap(), [0.25, 0.25]);
}

#[test]
fn corrupted_checksum_is_rejected() {
    let drive = FakeDrive::new();
    let (mut lift, _link) = open_on(&drive);
    drive.lock().corrupt_checksum = true;
    let err = lift.get_height().unwrap_err();
    assert!(
        matches!(err, Error::Codec(CodecError::ChecksumMismatch { .. })),
        "{err}"
    );
}

#[test]
fn silence_after_echoes_times_out() {
    let drive = FakeDrive::new();
    let (mut lift, link) = open_on(&drive);
    drive.lock().silent = true;
    let err = lift.get_height().unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert_eq!(link.pending_rx(), 0);
}

#[test]
fn truncated_response_is_dropped() {
    let drive = FakeDrive::new();
    let (mut lift, link) = open_on(&drive);
    drive.lock().silent = true;
    link.push_rx(&hex("7F 43 63 60 00 00"));
    assert!(lift.get_height().unwrap_err().is_timeout());

    // the next answer is not glued onto the stale bytes
    drive.lock().silent = false;
    drive.set(od::POSITION_ACTUAL, 1_792_000);
    assert_eq!(lift.get_height().unwrap(), 0.25);
}

#[test]
fn abort_frames_surface_as_device_aborts() {
    let drive = FakeDrive::new();
    let (mut lift, _link) = open_on(&drive);
    drive.lock().abort_on = Some((0x6063, 0x0800_0000));
    let err = lift.get_height().unwrap_err();
    assert!(matches!(
        err,
        Error::Codec(CodecError::DeviceAbort(AbortCode(0x0800_0000)))
    ));
}

#[test]
fn relative_moves_use_relative_control_words() {
    let drive = FakeDrive::new();
    let (mut lift, _link) = open_on(&drive);
    drive.take_writes();

    lift.move_by(178_400.0 / 7_168_000.0).unwrap();
    assert_eq!(
        drive.take_writes(),
        vec![(0x607A, 0, 178_400), (0x6040, 0, 0x4F), (0x6040, 0, 0x5F)]
    );

    lift.move_by(-178_400.0 / 7_168_000.0).unwrap();
    assert_eq!(drive.take_writes()[0], (0x607A, 0, (-178_400i32) as u32));

    assert!(matches!(lift.move_by(0.6), Err(Error::Usage(_))));
}

#[test]
fn status_over_serial() {
    let drive = FakeDrive::new();
    drive.set(od::POSITION_ACTUAL, 1_792_000);
    drive.set(od::ERROR_CODE_SECONDARY, 0x0010);
    let (lift, _link) = open_on(&drive);
    let mut dev: Box<dyn LiftDevice> = Box::new(lift);
    let status = dev.get_status().unwrap();
    assert_eq!(status.height_m, 0.25);
    assert_eq!(status.speed_mps, 0.0);
    assert_eq!(status.error_code, ErrorCode(0x0010_0000));
    assert_eq!(status.error_code.primary(), 0);
}

#[test]
fn metrics_track_resync_and_checksums() {
    init_tracing();
    let drive = FakeDrive::new();
    let hub = MetricsHub::new().unwrap();
    let link = MockLink::open("/dev/ttyS1", 38_400)
        .unwrap()
        .with_responder(drive.clone().uart_responder());
    let config = UartConfig::new("/dev/ttyS1");
    let channel = FramedChannel::new(link, config.timeout())
        .unwrap()
        .with_metrics(hub.link());
    let mut lift = UartLift::from_channel(channel, config.initial_speed_rpm).unwrap();
    assert_eq!(hub.link.requests.get(), 4);
    assert_eq!(hub.link.responses.get(), 1);

    drive.lock().garbage_prefix = vec![0xAA, 0xBB];
    lift.get_height().unwrap();
    assert_eq!(hub.link.resync_bytes.get(), 32);

    drive.lock().corrupt_checksum = true;
    assert!(lift.get_height().is_err());
    assert_eq!(hub.link.checksum_failures.get(), 1);
}

#[test]
fn close_releases_the_link() {
    let drive = FakeDrive::new();
    let (mut lift, link) = open_on(&drive);
    link.take_written();
    lift.close();
    assert!(matches!(lift.set_height(0.1), Err(Error::NotConnected)));
    assert!(matches!(lift.stop(), Err(Error::NotConnected)));
    assert!(link.written().is_empty());
}

#[cfg(not(feature = "serial"))]
#[test]
fn open_lift_without_serial_backend() {
    let config = LiftConfig {
        id: "right".into(),
        transport: TransportConfig::Uart(UartConfig::new("/dev/ttyUSB0")),
    };
    assert!(matches!(open_lift(&config), Err(Error::Config(_))));
}
