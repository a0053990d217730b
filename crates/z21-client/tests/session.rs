//! Session-level integration tests against a scripted loopback station.

use std::sync::Arc;
use std::time::Duration;

use z21_client::{ClientOptions, Z21Client};
use z21_core::{
    ConnectionState, DecoderMode, EventGroup, FirmwareVersion, HardwareType, LivenessProbe,
    TrackPowerState, Z21Code, Z21Event,
};
use z21_proto::wire;
use z21_test_harness::{MockStation, StaticProbe, SwitchProbe};
use z21_transport::UdpLinkFactory;

/// Timing shrunk so the whole suite runs in seconds; keep-alive and
/// watchdog stay effectively disabled unless a test opts in.
fn test_options() -> ClientOptions {
    ClientOptions {
        local_port: 0,
        probe_timeout: Duration::from_millis(100),
        handshake_timeout: Duration::from_millis(500),
        keepalive_period: Duration::from_secs(60),
        keepalive_idle: Duration::from_secs(40),
        watchdog_period: Duration::from_secs(60),
        watchdog_quiet: Duration::from_secs(15),
        railcom_poll_delay: Duration::from_millis(10),
        railcom_poll_period: Duration::from_millis(50),
        turnout_pulse: Duration::from_millis(5),
        turnout_settle: Duration::from_millis(5),
        ..ClientOptions::default()
    }
}

fn test_client(options: ClientOptions) -> Z21Client {
    Z21Client::with_parts(Arc::new(UdpLinkFactory), Arc::new(StaticProbe(true)), options)
}

/// Poll until `station` has seen `count` LAN_SET_BROADCASTFLAGS frames.
async fn wait_for_flag_sets(station: &MockStation, count: usize) {
    for _ in 0..100 {
        if station.flag_set_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "station saw {} flag sets, expected {count}",
        station.flag_set_count()
    );
}

fn xbus(body: &[u8]) -> Vec<u8> {
    wire::xbus_frame(body)
}

#[tokio::test]
async fn connect_handshake_populates_station_facts() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());

    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    assert!(client.is_connected());
    assert_eq!(client.connection_state().await, ConnectionState::Ready);

    let hw = client.hardware_info().await.expect("hardware info cached");
    assert_eq!(hw.hardware_type, HardwareType::Z21New);
    assert_eq!(hw.firmware, FirmwareVersion::new(1, 43));
    assert_eq!(client.serial_number().await, Some(123_456));
    assert_eq!(client.z21_code().await, Some(Z21Code::NoLock));
    assert!(client.capabilities().await.is_some());
    assert!(client.system_state().await.is_some());

    // Exactly one broadcast-flag publication during the handshake.
    wait_for_flag_sets(&station, 1).await;
    assert_eq!(station.flag_set_count(), 1);

    // The handshake issued the documented request sequence.
    let received = station.received().await;
    let headers: Vec<u16> = received
        .iter()
        .map(|f| u16::from_le_bytes([f[2], f[3]]))
        .collect();
    assert!(headers.contains(&0x001A), "hardware info request");
    assert!(headers.contains(&0x0085), "system state request");
    assert!(headers.contains(&0x0018), "code request");
    assert!(headers.contains(&0x0010), "serial request");
    assert!(headers.contains(&0x0050), "broadcast flags");

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_times_out_on_silent_station() {
    let station = MockStation::start_silent().await.unwrap();
    let client = test_client(ClientOptions {
        handshake_timeout: Duration::from_millis(150),
        ..test_options()
    });

    let result = client.connect("127.0.0.1", Some(station.port())).await;
    assert!(
        matches!(result, Err(z21_core::Error::Timeout)),
        "expected Timeout, got {result:?}"
    );
    assert!(!client.is_connected());
    assert_eq!(
        client.connection_state().await,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn connect_fails_when_ping_fails() {
    let station = MockStation::start().await.unwrap();
    let client = Z21Client::with_parts(
        Arc::new(UdpLinkFactory),
        Arc::new(StaticProbe(false)),
        test_options(),
    );

    let result = client.connect("127.0.0.1", Some(station.port())).await;
    assert!(matches!(result, Err(z21_core::Error::Unreachable(_))));
    assert!(!client.is_connected());

    // The handshake never started.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(station.received().await.is_empty());
}

#[tokio::test]
async fn connect_is_idempotent() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());

    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    // The second call was a no-op: still one flag publication.
    wait_for_flag_sets(&station, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(station.flag_set_count(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_sends_logoff_once() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    client.disconnect().await;
    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let logoffs = station
        .received()
        .await
        .iter()
        .filter(|f| f.as_slice() == [0x04, 0x00, 0x30, 0x00])
        .count();
    assert_eq!(logoffs, 1);
}

#[tokio::test]
async fn pushed_broadcasts_reach_subscribers() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    let mut sub = client.subscribe(EventGroup::DrivingSwitching).await;
    station
        .push(&xbus(&[wire::X_STATUS, 0x00]))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("event within deadline")
        .unwrap();
    assert!(matches!(
        event,
        Z21Event::TrackPowerInfoReceived(TrackPowerState::Off)
    ));

    client.disconnect().await;
}

#[tokio::test]
async fn broadcast_flag_refcounting_sends_on_edges_only() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();
    wait_for_flag_sets(&station, 1).await;

    // First listener: one push.
    let first = client.subscribe(EventGroup::SystemState).await;
    wait_for_flag_sets(&station, 2).await;

    // Second listener: count only.
    let second = client.subscribe(EventGroup::SystemState).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(station.flag_set_count(), 2);

    // Dropping one of two: count only.
    client.unsubscribe(first).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(station.flag_set_count(), 2);

    // Last listener gone: one push.
    client.unsubscribe(second).await;
    wait_for_flag_sets(&station, 3).await;

    client.disconnect().await;
}

#[tokio::test]
async fn loco_info_waits_for_paired_mode_reply() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    let mut sub = client.subscribe(EventGroup::DrivingSwitching).await;
    client
        .get_loco_info(z21_core::LocoAddress::new(3))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Loco info for the pending address is held back.
    station
        .push(&xbus(&[0xEF, 0x00, 0x03, 0x04, 0x8B, 0x10, 0x01, 0x00, 0x00]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sub.try_recv().is_none());

    // The mode reply releases it with the protocol overridden.
    station
        .push(&[0x07, 0x00, 0x60, 0x00, 0x00, 0x03, 0x01])
        .await
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("event within deadline")
        .unwrap();
    match event {
        Z21Event::LocoInfoReceived(info) => {
            assert_eq!(info.address.value(), 3);
            assert_eq!(info.mode, DecoderMode::Motorola);
            assert_eq!(info.speed, 10);
        }
        other => panic!("expected LocoInfoReceived, got {other:?}"),
    }

    client.disconnect().await;
}

#[tokio::test]
async fn watchdog_declares_session_lost() {
    let station = MockStation::start().await.unwrap();
    let probe = Arc::new(SwitchProbe::new(true));
    let client = Z21Client::with_parts(
        Arc::new(UdpLinkFactory),
        Arc::clone(&probe) as Arc<dyn LivenessProbe>,
        ClientOptions {
            watchdog_period: Duration::from_millis(50),
            watchdog_quiet: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(20),
            ..test_options()
        },
    );
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    let mut sub = client.subscribe(EventGroup::Connection).await;
    // Starve the session: no traffic, no ping replies.
    probe.set(false);

    let mut saw_lost = false;
    let mut saw_disconnected = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline && !(saw_lost && saw_disconnected) {
        match tokio::time::timeout_at(deadline, sub.recv()).await {
            Ok(Ok(Z21Event::ConnectionStateChanged(ConnectionState::Lost))) => saw_lost = true,
            Ok(Ok(Z21Event::ConnectionStateChanged(ConnectionState::Disconnected))) => {
                saw_disconnected = true
            }
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    assert!(saw_lost, "expected a Lost transition");
    assert!(saw_disconnected, "expected the teardown to complete");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn watchdog_tolerates_a_silent_but_reachable_station() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(ClientOptions {
        watchdog_period: Duration::from_millis(50),
        watchdog_quiet: Duration::from_millis(100),
        ..test_options()
    });
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    // Quiet link, but the (static true) probe keeps answering.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client.is_connected());
    client.disconnect().await;
}

#[tokio::test]
async fn keepalive_requests_system_state_when_idle() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(ClientOptions {
        keepalive_period: Duration::from_millis(50),
        keepalive_idle: Duration::from_millis(20),
        ..test_options()
    });
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    let baseline = station
        .received()
        .await
        .iter()
        .filter(|f| f[2] == 0x85)
        .count();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let after = station
        .received()
        .await
        .iter()
        .filter(|f| f[2] == 0x85)
        .count();
    assert!(
        after > baseline,
        "keep-alive sent no system-state requests ({baseline} -> {after})"
    );
    client.disconnect().await;
}

#[tokio::test]
async fn railcom_subscription_drives_the_polling_cycle() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    let mut sub = client.subscribe(EventGroup::RailCom).await;
    wait_for_flag_sets(&station, 2).await;

    // The poll timer asks the station for the next RailCom loco.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let polls = station
        .received()
        .await
        .iter()
        .filter(|f| f.as_slice() == [0x07, 0x00, 0x89, 0x00, 0x00, 0x00, 0x00])
        .count();
    assert!(polls >= 2, "expected repeated polls, saw {polls}");

    // RailCom data flows out as events.
    let mut frame = vec![0x0F, 0x00, 0x88, 0x00];
    frame.extend_from_slice(&5u16.to_le_bytes());
    frame.extend_from_slice(&42u32.to_le_bytes());
    frame.extend_from_slice(&0u16.to_le_bytes());
    frame.extend_from_slice(&[0, 0, 0]);
    station.push(&frame).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("event within deadline")
        .unwrap();
    match event {
        Z21Event::RailComDataReceived(data) => {
            assert_eq!(data.address.value(), 5);
            assert_eq!(data.receive_counter, 42);
        }
        other => panic!("expected RailComDataReceived, got {other:?}"),
    }

    // Unsubscribing the last listener stops the timer.
    client.unsubscribe(sub).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = station.received().await.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(station.received().await.len(), settled);

    client.disconnect().await;
}

#[tokio::test]
async fn range_checked_requests_reject_bad_input() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    assert!(matches!(
        client.get_loco_slot_info(0).await,
        Err(z21_core::Error::InvalidParameter(_))
    ));
    assert!(matches!(
        client.get_loco_slot_info(121).await,
        Err(z21_core::Error::InvalidParameter(_))
    ));
    assert!(matches!(
        client.get_rbus_data(2).await,
        Err(z21_core::Error::InvalidParameter(_))
    ));
    assert!(client.get_loco_slot_info(120).await.is_ok());
    assert!(client.get_rbus_data(1).await.is_ok());

    client.disconnect().await;
}

#[tokio::test]
async fn discovery_is_refused_while_connected() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    assert!(matches!(
        client.query_for_z21s(Duration::from_millis(50)).await,
        Err(z21_core::Error::InvalidParameter(_))
    ));
    client.disconnect().await;
}

#[tokio::test]
async fn turnout_position_emits_pulse_pair() {
    let station = MockStation::start().await.unwrap();
    let client = test_client(test_options());
    client
        .connect("127.0.0.1", Some(station.port()))
        .await
        .unwrap();

    client
        .set_turnout_position(21, z21_core::TurnoutPosition::P2)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let turnout_frames: Vec<Vec<u8>> = station
        .received()
        .await
        .into_iter()
        .filter(|f| f[2] == 0x40 && f.get(4) == Some(&wire::X_SET_TURNOUT))
        .collect();
    assert_eq!(turnout_frames.len(), 2);
    // Activation pulse then off-pulse, both for output P2.
    assert_eq!(turnout_frames[0][7], 0x89);
    assert_eq!(turnout_frames[1][7], 0x81);

    assert!(matches!(
        client
            .set_turnout_position(21, z21_core::TurnoutPosition::Unknown)
            .await,
        Err(z21_core::Error::InvalidParameter(_))
    ));

    client.disconnect().await;
}
