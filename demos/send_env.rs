use std::env;
use std::time::Duration;

use async_mailer::message::{Mailbox, Message};
use async_mailer::smtp::authentication::Credentials;
use async_mailer::{ClientSecurity, ClientTlsParameters, ServerAddress, SmtpClient, Transport};

// EMAIL=... PASSWORD=... [SMTPHOST=...] [SMTPUSER=...] cargo run --example send_env
#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let email = env::var("EMAIL").expect("EMAIL is not set");
    let password = env::var("PASSWORD").expect("PASSWORD is not set");
    let host = env::var("SMTPHOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
    let user = env::var("SMTPUSER").unwrap_or_else(|_| email.clone());

    let transport = SmtpClient::with_security(
        ServerAddress::new(host.clone(), 587),
        ClientSecurity::Required(ClientTlsParameters::default_roots(host)),
    )
    .credentials(Credentials::new(user, password))
    .timeout(Some(Duration::from_secs(10)))
    .into_transport();

    let sender = Mailbox::new(Some("Dr. Light"), &email).unwrap();
    let messages: Vec<Message> = ["Megaman", "Roll"]
        .iter()
        .map(|name| {
            Message::builder()
                .from(sender.clone())
                .to(Mailbox::new(Some(*name), &email).unwrap())
                .subject(format!("Orders for {}", name))
                .text(format!("{}, report to the lab.", name))
                .build()
                .unwrap()
        })
        .collect();

    for result in transport.send_all(&messages, 2).await {
        match result {
            Ok(delivery) => println!(
                "{} accepted for {} recipient(s)",
                delivery.message_id,
                delivery.accepted.len()
            ),
            Err(err) => println!("not sent: {}", err),
        }
    }
}
