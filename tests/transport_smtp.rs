#![cfg(feature = "runtime-tokio")]

use std::time::{Duration, Instant};

use async_mailer::message::{Mailbox, Message};
use async_mailer::smtp::error::{Error, ErrorKind};
use async_mailer::{ClientSecurity, Envelope, SendableEmail, ServerAddress, SmtpClient, Transport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Plays a relay that accepts everyone except `roll@`
async fn serve(stream: TcpStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    writer.write_all(b"220 localhost ESMTP fake\r\n").await?;

    let mut in_data = false;
    while let Some(line) = lines.next_line().await? {
        if in_data {
            if line == "." {
                in_data = false;
                writer.write_all(b"250 2.0.0 queued\r\n").await?;
            }
            continue;
        }

        let command = line.to_ascii_uppercase();
        let reply: &[u8] = if command.starts_with("EHLO") {
            b"250-localhost\r\n250-8BITMIME\r\n250 SIZE 1000000\r\n"
        } else if command.starts_with("MAIL FROM:") {
            b"250 2.1.0 ok\r\n"
        } else if command.starts_with("RCPT TO:") {
            if line.contains("<roll@") {
                b"550 5.1.1 user unknown\r\n"
            } else {
                b"250 2.1.5 ok\r\n"
            }
        } else if command == "DATA" {
            in_data = true;
            b"354 end with .\r\n"
        } else if command == "QUIT" {
            writer.write_all(b"221 2.0.0 bye\r\n").await?;
            return Ok(());
        } else {
            b"502 5.5.2 unknown command\r\n"
        };
        writer.write_all(reply).await?;
    }

    Ok(())
}

async fn fake_server() -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });

    ServerAddress::new("127.0.0.1".to_string(), port)
}

/// Accepts connections and never says a word
async fn silent_server() -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = vec![];
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    ServerAddress::new("127.0.0.1".to_string(), port)
}

fn message(to: &str, id: &str) -> Message {
    Message::builder()
        .from(Mailbox::new(Some("Dr. Light"), "dr.light@example.com").unwrap())
        .to(Mailbox::new(None::<String>, to).unwrap())
        .subject("status report")
        .text("All systems nominal.\r\n.\r\nThat dot was not the end.")
        .message_id(format!("<{}@example.com>", id))
        .build()
        .unwrap()
}

#[tokio::test]
async fn send_all_keeps_order() {
    let _ = env_logger::try_init();

    let transport = SmtpClient::with_security(fake_server().await, ClientSecurity::None)
        .timeout(Some(Duration::from_secs(10)))
        .into_transport();

    let messages = vec![
        message("megaman@example.com", "one"),
        message("roll@example.com", "two"),
        message("rush@example.com", "three"),
    ];
    let results = transport.send_all(&messages, 2).await;

    assert_eq!(results.len(), 3);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.message_id, "<one@example.com>");
    assert_eq!(first.accepted[0].to_string(), "megaman@example.com");

    let second = results[1].as_ref().unwrap_err();
    assert_eq!(second.message_id.as_deref(), Some("<two@example.com>"));
    assert!(matches!(second.error, Error::Envelope(ref rejected) if rejected.len() == 1));
    assert_eq!(second.rejected[0].code(), 550);

    let third = results[2].as_ref().unwrap();
    assert_eq!(third.message_id, "<three@example.com>");
}

#[tokio::test]
async fn silent_server_times_out() {
    let _ = env_logger::try_init();

    let transport = SmtpClient::with_security(silent_server().await, ClientSecurity::None)
        .timeout(Some(Duration::from_millis(200)))
        .into_transport();

    let started = Instant::now();
    let err = transport
        .send(&message("megaman@example.com", "late"))
        .await
        .unwrap_err();

    assert!(matches!(err.error, Error::Timeout));
    assert_eq!(err.error.kind(), ErrorKind::Timeout);
    assert!(err.error.is_transient());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancelled_delivery() {
    let _ = env_logger::try_init();

    let transport = SmtpClient::with_security(silent_server().await, ClientSecurity::None)
        .timeout(Some(Duration::from_secs(30)))
        .into_transport();

    let err = transport
        .send_until(
            &message("megaman@example.com", "cancelled"),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, Error::Cancelled));
    assert_eq!(err.message_id.as_deref(), Some("<cancelled@example.com>"));
}

#[tokio::test]
async fn refused_connection() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let transport = SmtpClient::with_security(
        ServerAddress::new("127.0.0.1".to_string(), port),
        ClientSecurity::None,
    )
    .timeout(Some(Duration::from_secs(5)))
    .into_transport();

    let err = transport
        .send(&message("megaman@example.com", "refused"))
        .await
        .unwrap_err();

    assert_eq!(err.error.kind(), ErrorKind::Connection);
    assert!(err.last_response.is_none());
}

#[tokio::test]
async fn raw_message_without_message_id() {
    // nothing listens here; the message must be refused before connecting
    let transport = SmtpClient::with_security(
        ServerAddress::new("127.0.0.1".to_string(), 9),
        ClientSecurity::None,
    )
    .into_transport();

    let email = SendableEmail::new(
        Envelope::new(
            Some("user@localhost".parse().unwrap()),
            vec!["root@localhost".parse().unwrap()],
        )
        .unwrap(),
        "id",
        "From: user@localhost\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         Hello example",
    );

    let err = transport.send_raw(&email).await.unwrap_err();
    assert_eq!(err.error.kind(), ErrorKind::Encoding);
}

#[tokio::test]
async fn invalid_message_never_connects() {
    let transport = SmtpClient::new_unencrypted_localhost().into_transport();

    let message = Message::builder()
        .from(Mailbox::new(Some("Dr. Light"), "dr.light@example.com").unwrap())
        .to(Mailbox::new(None::<String>, "megaman@example.com").unwrap())
        .subject("attachment")
        .text("see attached")
        .attachment(async_mailer::message::Attachment::from_path(
            "/nonexistent/blueprints.pdf",
            None,
        ))
        .build()
        .unwrap();

    let err = transport.send(&message).await.unwrap_err();
    assert!(matches!(
        err.error,
        Error::Content(async_mailer::error::Error::AttachmentUnreadable { .. })
    ));
}
