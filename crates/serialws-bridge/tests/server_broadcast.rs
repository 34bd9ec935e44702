//! Server-mode integration tests: real loopback websockets, scripted serial
//! input.

mod common;

use common::{connect, next_text, server_config, start_scripted, wait_for_peers};
use serialws_core::OverflowPolicy;

#[tokio::test]
async fn test_every_connected_peer_receives_each_line() {
    // Arrange: three consumers
    let (handle, script) = start_scripted(server_config()).await;
    let mut a = connect(&handle).await;
    let mut b = connect(&handle).await;
    let mut c = connect(&handle).await;
    wait_for_peers(&handle, 3).await;

    // Act
    script.push_bytes("21.5\r\n");

    // Assert: terminator stripped, one frame per line
    for ws in [&mut a, &mut b, &mut c] {
        assert_eq!(next_text(ws).await.as_deref(), Some("21.5"));
    }

    handle.stop().await;
}

#[tokio::test]
async fn test_late_peer_only_receives_lines_after_joining() {
    // Arrange
    let (handle, script) = start_scripted(server_config()).await;
    let mut early = connect(&handle).await;
    wait_for_peers(&handle, 1).await;
    script.push_line("first");
    assert_eq!(next_text(&mut early).await.as_deref(), Some("first"));

    // Act
    let mut late = connect(&handle).await;
    wait_for_peers(&handle, 2).await;
    script.push_line("second");

    // Assert: no replay of history for the late joiner
    assert_eq!(next_text(&mut late).await.as_deref(), Some("second"));
    assert_eq!(next_text(&mut early).await.as_deref(), Some("second"));

    handle.stop().await;
}

#[tokio::test]
async fn test_peer_closing_gracefully_does_not_stop_delivery_to_others() {
    // Arrange
    let (handle, script) = start_scripted(server_config()).await;
    let mut leaving = connect(&handle).await;
    let mut b = connect(&handle).await;
    let mut c = connect(&handle).await;
    wait_for_peers(&handle, 3).await;

    // Act: one consumer goes away while lines keep arriving
    leaving.close(None).await.expect("close handshake");
    drop(leaving);
    script.push_line("one");
    script.push_line("two");

    // Assert
    for ws in [&mut b, &mut c] {
        assert_eq!(next_text(ws).await.as_deref(), Some("one"));
        assert_eq!(next_text(ws).await.as_deref(), Some("two"));
    }
    wait_for_peers(&handle, 2).await;

    handle.stop().await;
}

#[tokio::test]
async fn test_peer_socket_dropped_mid_broadcast_does_not_stop_delivery_to_others() {
    // Arrange
    let (handle, script) = start_scripted(server_config()).await;
    let mut dropped = connect(&handle).await;
    let mut b = connect(&handle).await;
    let mut c = connect(&handle).await;
    wait_for_peers(&handle, 3).await;

    // Act: the socket goes away without a Close frame while lines are flowing
    for i in 0..20 {
        script.push_line(&format!("m{i}"));
    }
    assert_eq!(next_text(&mut dropped).await.as_deref(), Some("m0"));
    drop(dropped);
    for i in 20..40 {
        script.push_line(&format!("m{i}"));
    }

    // Assert
    for ws in [&mut b, &mut c] {
        for i in 0..40 {
            assert_eq!(next_text(ws).await, Some(format!("m{i}")));
        }
    }
    wait_for_peers(&handle, 2).await;

    handle.stop().await;
}

#[tokio::test]
async fn test_lines_arrive_in_read_order() {
    // Arrange: bytes split at awkward places
    let mut config = server_config();
    config.transport.peer_queue_depth = 256;
    config.transport.backpressure = OverflowPolicy::DropOldest;
    let (handle, script) = start_scripted(config).await;
    let mut ws = connect(&handle).await;
    wait_for_peers(&handle, 1).await;

    // Act
    script.push_bytes("l0\nl");
    script.push_bytes("1\r");
    script.push_bytes("\nl2\n");
    for i in 3..50 {
        script.push_line(&format!("l{i}"));
    }

    // Assert
    for i in 0..50 {
        assert_eq!(next_text(&mut ws).await, Some(format!("l{i}")));
    }

    handle.stop().await;
}

#[tokio::test]
async fn test_stop_flushes_partial_line_then_closes() {
    // Arrange: an unterminated final line
    let (handle, script) = start_scripted(server_config()).await;
    let mut ws = connect(&handle).await;
    wait_for_peers(&handle, 1).await;
    script.push_line("complete");
    script.push_bytes("partial");
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("complete"));
    common::eventually("script consumed", || script.is_drained()).await;

    // Act
    let stats = handle.stop().await;

    // Assert
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("partial"));
    assert_eq!(next_text(&mut ws).await, None, "server closes after the flush");
    assert_eq!(stats.lines_read, 2);
    assert_eq!(stats.lines_delivered, 2);
    assert_eq!(script.live_handles(), 0, "device released on stop");
}

#[tokio::test]
async fn test_invalid_bytes_are_relayed_with_placeholders() {
    // Arrange
    let (handle, script) = start_scripted(server_config()).await;
    let mut ws = connect(&handle).await;
    wait_for_peers(&handle, 1).await;

    // Act: a truncated UTF-8 sequence and a NUL byte
    script.push_bytes(b"ok\xC3\x00!\n".to_vec());

    // Assert
    let line = next_text(&mut ws).await.expect("line delivered");
    assert!(line.starts_with("ok"));
    assert!(line.ends_with('!'));
    assert!(line.contains('\u{FFFD}'));
    assert!(!line.contains('\0'));
    assert!(handle.metrics().decode_substitutions >= 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_device_unplug_is_recovered() {
    // Arrange
    let mut config = server_config();
    config.serial.reopen_backoff.initial_delay_ms = 10;
    let (handle, script) = start_scripted(config).await;
    let mut ws = connect(&handle).await;
    wait_for_peers(&handle, 1).await;

    // Act: the adapter disappears, then data flows again
    script.push_line("before");
    script.push_close();
    script.push_line("after");

    // Assert
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("before"));
    assert_eq!(next_text(&mut ws).await.as_deref(), Some("after"));
    assert_eq!(handle.metrics().device_reopens, 1);
    assert!(script.max_live_handles() <= 1);

    handle.stop().await;
}
