//! Tests for the command set of an instrument session

mod common;

use common::*;

#[tokio::test]
async fn test_open_negotiates_initial_packet_size() {
    let mock = MockTransport::new();
    mock.echo("ps 2");
    let session = Di2108::with_transport(mock.clone(), SessionConfig::default())
        .await
        .unwrap();

    assert_eq!(session.packet_size(), PacketSize::Bytes64);
    assert_eq!(mock.writes(), vec!["ps 2 \r"]);
    assert_eq!(mock.read_sizes(), vec![64]);
}

#[tokio::test]
async fn test_set_packet_size_every_size() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    for size in PacketSize::ALL {
        mock.echo(&format!("ps {}", size.index()));
        let before = mock.read_sizes().len();

        let agreed = session.set_packet_size(size).await.unwrap();

        assert!(agreed, "{size} should be confirmed");
        assert_eq!(session.packet_size(), size);
        assert_eq!(mock.last_write().unwrap(), format!("ps {} \r", size.index()));
        // The echo itself is already read in the new chunk size
        assert_eq!(mock.read_sizes()[before], size.bytes());
    }
}

#[tokio::test]
async fn test_packet_size_used_by_next_command() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    mock.echo("ps 0");
    session.set_packet_size(PacketSize::Bytes16).await.unwrap();

    mock.echo("led 1");
    session.led(LedColor::Blue).await.unwrap();
    assert_eq!(mock.read_sizes().last(), Some(&16));
}

#[tokio::test]
async fn test_ps_disagreement_reports_false() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    mock.echo("ps 3");
    let agreed = session.set_packet_size(PacketSize::Bytes256).await.unwrap();
    assert!(!agreed);
    // The local size is updated regardless
    assert_eq!(session.packet_size(), PacketSize::Bytes256);
}

#[tokio::test]
async fn test_check_connection() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    mock.echo_with("info 0 ", " DATAQ");
    assert!(session.check_connection().await.unwrap());
    assert_eq!(mock.last_write().unwrap(), "info 0 \r");

    mock.echo_with("info 0", "dataq");
    assert!(!session.check_connection().await.unwrap());

    mock.echo_with("info 0", "DATAQ2");
    assert!(!session.check_connection().await.unwrap());
}

#[tokio::test]
async fn test_info_getters() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    mock.echo_with("info 1", "2108");
    assert_eq!(session.device_name().await.unwrap(), "2108");

    mock.echo_with("info 2", "6516");
    assert_eq!(session.firmware_revision().await.unwrap(), "6516");

    mock.echo_with("info 6", "12345678");
    assert_eq!(session.serial_number().await.unwrap(), "12345678");

    mock.echo_with("info 9", "60000000");
    assert_eq!(session.sample_rate_divisor().await.unwrap(), 60_000_000);

    assert_eq!(
        mock.writes(),
        vec!["info 1\r", "info 2\r", "info 6\r", "info 9\r"]
    );
}

#[tokio::test]
async fn test_sample_rate_divisor_garbage() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    mock.echo_with("info 9", "sixty");
    assert!(matches!(
        session.sample_rate_divisor().await,
        Err(Error::ProtocolMismatch { .. })
    ));
}

#[tokio::test]
async fn test_configuration_verbs() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    mock.echo("srate 1000");
    session.srate(1000).await.unwrap();
    mock.echo("filter * 1");
    session.filter(FilterTarget::All, FilterMode::Cic).await.unwrap();
    mock.echo("filter 2 3");
    session.filter(FilterTarget::Channel(2), FilterMode::Minimum).await.unwrap();
    mock.echo("dec 64");
    session.dec(64).await.unwrap();
    mock.echo("ffl 8");
    session.ffl(8).await.unwrap();
    mock.echo("dout 5");
    session.dout(5).await.unwrap();
    mock.echo("endo 127");
    session.endo(127).await.unwrap();
    mock.echo("reset 1");
    session.reset().await.unwrap();

    assert_eq!(
        mock.writes(),
        vec![
            "srate 1000\r",
            "filter * 1 \r",
            "filter 2 3 \r",
            "dec 64 \r",
            "ffl 8\r",
            "dout 5\r",
            "endo 127\r",
            "reset 1\r",
        ]
    );
    assert_eq!(mock.pending(), 0);
}

#[tokio::test]
async fn test_led_cycle() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    for color in LedColor::ALL {
        mock.echo(&format!("led {}", u8::from(color)));
        session.led(color).await.unwrap();
    }
    let writes = mock.writes();
    assert_eq!(writes.len(), 8);
    assert_eq!(writes[0], "led 0\r");
    assert_eq!(writes[7], "led 7\r");
}

#[tokio::test]
async fn test_digital_inputs() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    mock.echo_with("din", "93");
    assert_eq!(session.digital_inputs().await.unwrap(), 93);
    assert_eq!(mock.last_write().unwrap(), "din\r");

    mock.echo_with("din", "255");
    assert!(matches!(
        session.digital_inputs().await,
        Err(Error::ProtocolMismatch { .. })
    ));
}

#[tokio::test]
async fn test_out_of_range_arguments_never_reach_the_wire() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    assert!(matches!(session.dec(0).await, Err(Error::Configuration(_))));
    assert!(matches!(session.dec(513).await, Err(Error::Configuration(_))));
    assert!(matches!(session.info(10).await, Err(Error::Configuration(_))));
    assert!(matches!(session.srate(100).await, Err(Error::Configuration(_))));
    assert!(matches!(session.dout(0x80).await, Err(Error::Configuration(_))));
    assert!(matches!(
        session.add_channel(12, Channel::ANALOG_0).await,
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        session.add_channel(0, Channel::Analog(9)).await,
        Err(Error::Configuration(_))
    ));

    assert!(mock.writes().is_empty());
}

#[tokio::test]
async fn test_echo_mismatch_is_reported() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    mock.echo("led 4");
    match session.srate(1000).await {
        Err(Error::ProtocolMismatch { expected, actual }) => {
            assert_eq!(expected, "srate 1000");
            assert_eq!(actual, "led 4");
        }
        other => panic!("expected ProtocolMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let (mut session, _mock) = connected(PacketSize::Bytes64).await;
    let err = session.led(LedColor::Red).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
}

#[tokio::test]
async fn test_echo_spanning_packets() {
    let (mut session, mock) = connected(PacketSize::Bytes16).await;
    // 16-byte packet without a sentinel, then the short tail
    mock.reply("info 6 123456789");
    mock.reply("0\r");
    assert_eq!(session.serial_number().await.unwrap(), "1234567890");
    assert_eq!(mock.read_sizes(), vec![16, 16]);
}

#[tokio::test]
async fn test_null_terminated_full_packet() {
    let (mut session, mock) = connected(PacketSize::Bytes16).await;
    let mut packet = b"info 1 2108\r".to_vec();
    packet.resize(16, 0);
    mock.reply(packet);
    assert_eq!(session.device_name().await.unwrap(), "2108");
    assert_eq!(mock.read_sizes().len(), 1);
}

#[tokio::test]
async fn test_execute_rejects_start() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    assert!(matches!(
        session.execute(Command::Start(ScanMode::Normal)).await,
        Err(Error::Configuration(_))
    ));
    assert!(mock.writes().is_empty());
}

#[tokio::test]
async fn test_slist_registers_scan_list() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;
    mock.echo("slist 0 3");
    session.add_channel(0, Channel::ANALOG_3).await.unwrap();
    mock.echo("slist 1 265");
    session
        .add_channel(1, Channel::DigitalRate(RateRange::Hz50000))
        .await
        .unwrap();

    assert_eq!(mock.writes(), vec!["slist 0 3\r", "slist 1 265\r"]);
    let list = session.scan_list();
    assert_eq!(list.slot_of(Channel::ANALOG_3), Some(0));
    assert_eq!(list.slot_of(Channel::DigitalRate(RateRange::Hz50000)), Some(1));
}

#[tokio::test]
async fn test_failed_slist_does_not_register() {
    let (mut session, _mock) = connected(PacketSize::Bytes64).await;
    assert!(session.add_channel(0, Channel::ANALOG_1).await.is_err());
    assert!(session.scan_list().is_empty());
}

#[tokio::test]
async fn test_echo_of_a_longer_line_is_a_mismatch() {
    let (mut session, mock) = connected(PacketSize::Bytes64).await;

    mock.echo("srate 10000");
    assert!(matches!(session.srate(1000).await, Err(Error::ProtocolMismatch { .. })));

    mock.echo("dout 12");
    assert!(matches!(session.dout(1).await, Err(Error::ProtocolMismatch { .. })));

    mock.echo("led 12");
    assert!(matches!(
        session.led(LedColor::Blue).await,
        Err(Error::ProtocolMismatch { .. })
    ));
}
