// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Loopback TCP integration tests covering a full login/logout round trip
//! for both session kinds (C9/C12) over the shared substrate (C7).

use std::{sync::Arc, time::Duration};

use soupbin_fix_client_rs::{
    fix::{FixClientSession, FixMessageRegistry, Message, catalog, field::FixValue},
    session::SessionOptions,
    soup::{SoupClientSession, messages::SoupMessage},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    time::timeout,
};

#[tokio::test]
async fn soup_login_and_logout_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");

        // Read the LoginRequest frame (2-byte length prefix + indicator + body).
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.expect("read len");
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.expect("read body");
        assert_eq!(body[0], b'L');

        let accepted = SoupMessage::LoginAccepted { session_id: "sess0001".into(), sequence: "1".into() };
        stream.write_all(&accepted.to_bytes().expect("encode")).await.expect("write");

        // Read the LogoutRequest frame and end the session.
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.expect("read logout len");
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.expect("read logout body");
        assert_eq!(body[0], b'O');
    });

    let session = SoupClientSession::connect(
        addr,
        Duration::from_secs(30),
        Duration::from_secs(30),
        SessionOptions::default(),
        Arc::new(|| {}),
    )
    .await
    .expect("connect");

    timeout(Duration::from_secs(2), session.login("user", "pass", "session", "1"))
        .await
        .expect("login timed out")
        .expect("login failed");

    assert_eq!(session.session_id_sync().as_deref(), Some("sess0001"));
    assert_eq!(session.sequence(), 1);

    session.logout().await.expect("logout");
    timeout(Duration::from_secs(2), server).await.expect("server timed out").expect("server task panicked");
}

#[tokio::test]
async fn fix_login_and_logout_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");

        let logon_bytes = read_fix_frame(&mut stream).await;
        let logon_str = String::from_utf8_lossy(&logon_bytes);
        assert!(logon_str.contains("35=A\u{1}"));
        assert!(logon_str.contains("49=CLIENT\u{1}"));
        assert!(logon_str.contains("56=EXCHANGE\u{1}"));

        let mut reply = Message::new(catalog::LOGON_DEF.clone());
        reply.header.set_field("SenderCompID", FixValue::Str("EXCHANGE".into())).unwrap();
        reply.header.set_field("TargetCompID", FixValue::Str("CLIENT".into())).unwrap();
        reply.header.set_field("MsgSeqNum", FixValue::Int(1)).unwrap();
        reply.header.set_field("SendingTime", FixValue::Str("20260101-00:00:00".into())).unwrap();
        reply.body.set_field("EncryptMethod", FixValue::Int(0)).unwrap();
        reply.body.set_field("HeartBtInt", FixValue::Int(30)).unwrap();
        let joined = reply.to_bytes().expect("encode reply body");
        let framed = soupbin_fix_client_rs::fix::message::frame("FIX.4.4", "A", &joined);
        stream.write_all(&framed).await.expect("write reply");

        let logout_bytes = read_fix_frame(&mut stream).await;
        let logout_str = String::from_utf8_lossy(&logout_bytes);
        assert!(logout_str.contains("35=5\u{1}"));
    });

    let registry = Arc::new(FixMessageRegistry::new());
    catalog::register_into(&registry, "fix").expect("register catalog");

    let session = FixClientSession::connect(addr, "FIX.4.4", "fix", registry, SessionOptions::default(), Arc::new(|| {}))
        .await
        .expect("connect");

    let mut logon = Message::new(catalog::LOGON_DEF.clone());
    logon.header.set_field("SenderCompID", FixValue::Str("CLIENT".into())).unwrap();
    logon.header.set_field("TargetCompID", FixValue::Str("EXCHANGE".into())).unwrap();
    logon.header.set_field("MsgSeqNum", FixValue::Int(1)).unwrap();
    logon.header.set_field("SendingTime", FixValue::Str("20260101-00:00:00".into())).unwrap();
    logon.body.set_field("EncryptMethod", FixValue::Int(0)).unwrap();
    logon.body.set_field("HeartBtInt", FixValue::Int(30)).unwrap();

    timeout(Duration::from_secs(2), session.login(logon)).await.expect("login timed out").expect("login failed");

    session.logout(None).await.expect("logout");
    timeout(Duration::from_secs(2), server).await.expect("server timed out").expect("server task panicked");
}

/// Reads one complete FIX frame off `stream` by locating `10=NNN<SOH>`.
async fn read_fix_frame(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        if let Some(pos) = find_checksum_end(&buf) {
            return buf[..pos].to_vec();
        }
        let n = stream.read(&mut chunk).await.expect("read fix frame");
        assert!(n > 0, "connection closed mid-frame");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_checksum_end(buf: &[u8]) -> Option<usize> {
    let marker = b"10=";
    let pos = buf.windows(marker.len()).position(|w| w == marker)?;
    let soh_offset = buf[pos..].iter().position(|&b| b == 0x01)?;
    Some(pos + soh_offset + 1)
}
