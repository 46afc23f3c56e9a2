//! Graceful shutdown behavior over real sockets.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{send_request, start_server};

#[tokio::test]
async fn exit_stops_accepting_and_run_returns() {
    let server = start_server().await;

    // Sanity check the server is up before stopping it.
    let response = send_request(server.addr, b"GNTP/1.0 SUBSCRIBE NONE\r\n\r\n").await;
    assert!(response.contains("Error-Code: 300\r\n"));

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), server.server)
        .await
        .expect("run did not return after shutdown")
        .unwrap();

    // The listening socket is gone; new connections are refused or reset
    // before a response can be read.
    match TcpStream::connect(server.addr).await {
        Err(_) => {}
        Ok(mut stream) => {
            let mut buf = Vec::new();
            let n = stream.read_to_end(&mut buf).await.unwrap_or(0);
            assert_eq!(n, 0, "got a response after shutdown: {buf:?}");
        }
    }
}

#[tokio::test]
async fn in_flight_request_completes_during_drain() {
    let mut server = start_server().await;

    send_request(
        server.addr,
        b"GNTP/1.0 REGISTER NONE\r\n\
          Application-Name: Foo\r\n\
          Notifications-Count: 1\r\n\r\n\
          Notification-Name: Bar\r\n\r\n",
    )
    .await;

    // Open a connection and send only half the request.
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GNTP/1.0 NOTIFY NONE\r\nApplication-Name: Foo\r\n")
        .await
        .unwrap();
    // Give the accept loop time to hand the connection off.
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.shutdown.trigger();

    // Finish the request after shutdown was requested; it is already in
    // flight, so it drains to completion.
    stream
        .write_all(b"Notification-Name: Bar\r\nNotification-Title: Late\r\n\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.contains("Response-Action: NOTIFY\r\n"), "{response:?}");

    tokio::time::timeout(Duration::from_secs(2), server.server)
        .await
        .expect("run did not return after drain")
        .unwrap();

    let delivered = server.notifications.recv().await.unwrap();
    assert_eq!(delivered.title, "Late");
}
