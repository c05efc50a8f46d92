//! Device tunnel integration tests

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use usbmux_client::Device;
use usbmux_core::{ConnectError, TUNNEL_NETWORK};
use usbmux_protocol::{ConnectRequest, ResultAck};

use common::{accept, client, read_frame, send, EventLog, MockDaemon};

const TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_port_unavailable_closes_transport() {
    let (daemon, mut accept_rx) = MockDaemon::new(EventLog::default());
    let client = client(&daemon);

    let daemon_side = tokio::spawn(async move {
        let mut conn = accept(&mut accept_rx).await;
        let request: ConnectRequest = read_frame(&mut conn).await.unwrap().decode().unwrap();
        send(&mut conn, &ResultAck::new(3)).await;

        let mut rest = Vec::new();
        let read = conn.read_to_end(&mut rest).await.unwrap();
        (request, read)
    });

    let result = client.connect(7, 22, TIMEOUT).await;
    assert!(matches!(result, Err(ConnectError::PortUnavailable)));

    let (request, trailing) = daemon_side.await.unwrap();
    assert_eq!(request.device_id, 7);
    assert_eq!(request.port_number, 0x1600);
    assert_eq!(request.prog_name, "usbmux-test");
    assert_eq!(trailing, 0);
}

#[tokio::test]
async fn test_successful_tunnel_carries_bytes() {
    let (daemon, mut accept_rx) = MockDaemon::new(EventLog::default());
    let device = Device::new(client(&daemon), 7, "ABC123", 0x1234);

    let daemon_side = tokio::spawn(async move {
        let mut conn = accept(&mut accept_rx).await;
        read_frame(&mut conn).await.unwrap();
        send(&mut conn, &ResultAck::new(0)).await;
        conn.write_all(b"SSH-2.0-device\r\n").await.unwrap();

        let mut hello = [0u8; 5];
        conn.read_exact(&mut hello).await.unwrap();
        hello
    });

    let mut tunnel = device.dial(TUNNEL_NETWORK, "22", TIMEOUT).await.unwrap();
    let mut banner = [0u8; 16];
    tunnel.read_exact(&mut banner).await.unwrap();
    assert_eq!(&banner, b"SSH-2.0-device\r\n");

    tunnel.write_all(b"hello").await.unwrap();
    assert_eq!(&daemon_side.await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_error_codes_map_to_errors() {
    for number in [2i64, 5, 1] {
        let (daemon, mut accept_rx) = MockDaemon::new(EventLog::default());
        let client = client(&daemon);

        tokio::spawn(async move {
            let mut conn = accept(&mut accept_rx).await;
            read_frame(&mut conn).await.unwrap();
            send(&mut conn, &ResultAck::new(number)).await;
        });

        let err = match client.connect(7, 22, TIMEOUT).await {
            Err(e) => e,
            Ok(_) => panic!("code {} opened a tunnel", number),
        };
        match number {
            2 => assert!(matches!(err, ConnectError::DeviceDisconnected), "{:?}", err),
            5 => assert!(matches!(err, ConnectError::MalformedRequest), "{:?}", err),
            _ => assert!(matches!(err, ConnectError::Refused { code: 1 }), "{:?}", err),
        }
    }
}

#[tokio::test]
async fn test_dial_failure_surfaces_as_transport_error() {
    let (daemon, _accept_rx) = MockDaemon::new(EventLog::default());
    daemon.refuse_next(1);

    let result = client(&daemon).connect(7, 22, TIMEOUT).await;
    assert!(matches!(result, Err(ConnectError::Transport(_))));
}

#[tokio::test(start_paused = true)]
async fn test_silent_daemon_times_out() {
    let (daemon, mut accept_rx) = MockDaemon::new(EventLog::default());
    let client = client(&daemon);

    let holder = tokio::spawn(async move {
        let conn = accept(&mut accept_rx).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(conn);
    });

    let result = client.connect(7, 22, TIMEOUT).await;
    assert!(matches!(result, Err(ConnectError::Timeout)));
    holder.abort();
}
