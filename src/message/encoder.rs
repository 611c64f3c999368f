//! RFC 5322 / RFC 2045 serialization of a [`Message`]

use chrono::{DateTime, FixedOffset, Local};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Attachment, Mailbox, Message};
use crate::error::{EmailResult, Error};
use crate::types::SendableEmail;

/// Maximum length of a base64 body line (RFC 2045 section 6.8)
pub const BASE64_LINE_LENGTH: usize = 76;

/// Header lines longer than this are folded
const HEADER_LINE_LENGTH: usize = 78;

/// Source bytes per RFC 2047 encoded word, keeps each word under 75 characters
const ENCODED_WORD_BYTES: usize = 45;

const BOUNDARY_LENGTH: usize = 40;

const MESSAGE_ID_TOKEN_LENGTH: usize = 32;

/// Base64 with CRLF line breaks every [`BASE64_LINE_LENGTH`] characters.
///
/// There is no trailing line break.
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = base64::encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2);
    for (idx, c) in encoded.chars().enumerate() {
        if idx > 0 && idx % BASE64_LINE_LENGTH == 0 {
            wrapped.push_str("\r\n");
        }
        wrapped.push(c);
    }
    wrapped
}

/// One node of the MIME tree
#[derive(Debug)]
enum Part {
    Single {
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    Multi {
        kind: &'static str,
        boundary: String,
        parts: Vec<Part>,
    },
}

impl Part {
    fn base64<C: Into<String>>(content_type: C, data: &[u8]) -> Part {
        Part::Single {
            headers: vec![
                ("Content-Type", content_type.into()),
                ("Content-Transfer-Encoding", "base64".to_string()),
            ],
            body: encode_base64_wrapped(data),
        }
    }

    fn text(subtype: &str, text: &str) -> Part {
        Part::base64(format!("text/{}; charset=utf-8", subtype), text.as_bytes())
    }

    fn attachment(attachment: &Attachment, data: &[u8]) -> Part {
        let filename = quote(&encode_words(attachment.filename()));
        let mut part = Part::base64(
            format!("{}; name={}", attachment.content_type(), filename),
            data,
        );
        if let Part::Single {
            ref mut headers, ..
        } = part
        {
            match attachment.content_id() {
                Some(content_id) => {
                    headers.push(("Content-Disposition", format!("inline; filename={}", filename)));
                    headers.push(("Content-ID", format!("<{}>", content_id)));
                }
                None => headers.push((
                    "Content-Disposition",
                    format!("attachment; filename={}", filename),
                )),
            }
        }
        part
    }

    fn contains(&self, needle: &str) -> bool {
        match self {
            Part::Single { body, .. } => body.contains(needle),
            Part::Multi {
                boundary, parts, ..
            } => boundary.contains(needle) || parts.iter().any(|part| part.contains(needle)),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Part::Single { headers, body } => {
                for (name, value) in headers {
                    write_header(out, name, value);
                }
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(body.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Part::Multi {
                kind,
                boundary,
                parts,
            } => {
                write_header(
                    out,
                    "Content-Type",
                    &format!("multipart/{}; boundary=\"{}\"", kind, boundary),
                );
                out.extend_from_slice(b"\r\n");
                for part in parts {
                    out.extend_from_slice(b"--");
                    out.extend_from_slice(boundary.as_bytes());
                    out.extend_from_slice(b"\r\n");
                    part.write(out);
                }
                out.extend_from_slice(b"--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(b"--\r\n");
            }
        }
    }
}

/// Serializes messages
///
/// Boundaries and generated Message-Id tokens come from the encoder's random
/// source, so two encoders built with the same seed produce identical output
/// for messages carrying a fixed date.
#[derive(Debug)]
pub struct MimeEncoder {
    rng: StdRng,
}

impl Default for MimeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeEncoder {
    pub fn new() -> Self {
        MimeEncoder {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        MimeEncoder {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn token(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// `<random-token@domain>`
    pub fn generate_message_id(&mut self, domain: &str) -> String {
        format!("<{}@{}>", self.token(MESSAGE_ID_TOKEN_LENGTH), domain)
    }

    fn multipart(&mut self, kind: &'static str, parts: Vec<Part>) -> Part {
        let boundary = loop {
            let candidate = self.token(BOUNDARY_LENGTH);
            if !parts.iter().any(|part| part.contains(&candidate)) {
                break candidate;
            }
        };
        Part::Multi {
            kind,
            boundary,
            parts,
        }
    }

    fn body(&mut self, message: &Message, attachments: &[(&Attachment, Vec<u8>)]) -> EmailResult<Part> {
        let text = message.text.as_ref().map(|text| Part::text("plain", text));
        let html = message.html.as_ref().map(|html| Part::text("html", html));
        let mut body = match (text, html) {
            (Some(text), Some(html)) => self.multipart("alternative", vec![text, html]),
            (Some(part), None) | (None, Some(part)) => part,
            (None, None) => return Err(Error::MissingBody),
        };

        let (inline, attached): (Vec<_>, Vec<_>) = attachments
            .iter()
            .partition(|(attachment, _)| attachment.content_id().is_some());

        if !inline.is_empty() {
            let mut parts = vec![body];
            parts.extend(
                inline
                    .iter()
                    .map(|(attachment, data)| Part::attachment(attachment, data)),
            );
            body = self.multipart("related", parts);
        }
        if !attached.is_empty() {
            let mut parts = vec![body];
            parts.extend(
                attached
                    .iter()
                    .map(|(attachment, data)| Part::attachment(attachment, data)),
            );
            body = self.multipart("mixed", parts);
        }
        Ok(body)
    }

    /// Encodes `message` into the DATA payload, together with its envelope.
    ///
    /// Attachment files are read here, before anything is written, so a
    /// failure never leaves a half-built payload behind.
    pub fn encode(&mut self, message: &Message) -> EmailResult<SendableEmail> {
        let attachments = message
            .attachments
            .iter()
            .map(|attachment| Ok((attachment, attachment.read()?)))
            .collect::<EmailResult<Vec<_>>>()?;

        let envelope = message.envelope()?;
        let message_id = match message.message_id {
            Some(ref message_id) => message_id.clone(),
            None => self.generate_message_id(message.from.email().domain()),
        };
        let date: DateTime<FixedOffset> = message.date.unwrap_or_else(|| Local::now().into());
        let body = self.body(message, &attachments)?;

        let mut out = Vec::with_capacity(1024);
        write_header(&mut out, "From", &mailbox_header(&message.from));
        write_header(&mut out, "To", &mailbox_list_header(&message.to));
        if !message.cc.is_empty() {
            write_header(&mut out, "Cc", &mailbox_list_header(&message.cc));
        }
        if let Some(ref reply_to) = message.reply_to {
            write_header(&mut out, "Reply-To", &mailbox_header(reply_to));
        }
        write_header(&mut out, "Subject", &encode_words(&message.subject));
        write_header(&mut out, "Message-Id", &message_id);
        write_header(&mut out, "Date", &date.to_rfc2822());
        for (name, value) in &message.headers {
            write_header(&mut out, name, &encode_words(value));
        }
        write_header(&mut out, "MIME-Version", "1.0");
        body.write(&mut out);

        Ok(SendableEmail::new(envelope, message_id, out))
    }
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.push(b':');
    if !value.is_empty() {
        out.push(b' ');
        out.extend_from_slice(fold(name.len() + 2, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

/// Folds `value` at spaces so no line exceeds the limit where avoidable
fn fold(prefix: usize, value: &str) -> String {
    if prefix + value.len() <= HEADER_LINE_LENGTH {
        return value.to_string();
    }

    let mut folded = String::with_capacity(value.len() + 16);
    let mut line = prefix;
    for (idx, word) in value.split(' ').enumerate() {
        if idx > 0 {
            if line + 1 + word.len() > HEADER_LINE_LENGTH {
                folded.push_str("\r\n");
                line = 0;
            }
            folded.push(' ');
            line += 1;
        }
        folded.push_str(word);
        line += word.len();
    }
    folded
}

/// RFC 2047 `B` encoded words for non-ASCII text, the text itself otherwise
fn encode_words(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?utf-8?b?{}?=", base64::encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?b?{}?=", base64::encode(&chunk)));
    }
    words.join(" ")
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn mailbox_header(mailbox: &Mailbox) -> String {
    match mailbox.name() {
        Some(name) if name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) => {
            format!("{} <{}>", quote(name), mailbox.email())
        }
        Some(name) => format!("{} <{}>", encode_words(name), mailbox.email()),
        None => mailbox.email().to_string(),
    }
}

fn mailbox_list_header(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(mailbox_header)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::header_message_id;
    use mailparse::MailHeaderMap;

    const RANDOM_TEXT_1: &str = "Picture removal detract earnest is by. Esteems met joy attempt way clothes yet demesne tedious. Replying an marianne do it an entrance advanced. Two dare say play when hold. Required bringing me material stanhill jointure is as he. Mutual indeed yet her living result matter him bed whence.";
    const RANDOM_TEXT_2: &str = "Brillo viento gas esa contar hay. Alla no toda lune faro daba en pero. Ir rumiar altura id venian. El robusto hablado ya diarios tu hacerla mermado. Las sus renunciaba llamaradas misteriosa doscientas favorcillo dos pie. Una era fue pedirselos periodicos doscientas actualidad con. Exigian un en oh algunos adivino parezca notario yo. Eres oro dos mal lune vivo sepa les seda. Tio energia una esa abultar por tufillo sirenas persona suspiro. Me pandero tardaba pedirme puertas so senales la.";
    const RANDOM_TEXT_3: &str = "Intueor veritas suo majoris attinet rem res aggredi similia mei. Disputari abducerem ob ex ha interitum conflatos concipiam. Curam plura aequo rem etc serio fecto caput. Ea posterum lectorem remanere experiar videamus gi cognitum vi. Ad invenit accepit to petitis ea usitata ad. Hoc nam quibus hos oculis cumque videam ita. Res cau infinitum quadratam sanguinem.";
    const TEXT: &str =
        "Humans and robots living together in harmony and equality: That was my ultimate wish.";
    const HTML: &str = "<html><img src=\"cid:robots\"/></html>";

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc2822("Tue, 1 Jul 2003 10:52:37 +0200").unwrap()
    }

    fn builder() -> crate::message::MessageBuilder {
        Message::builder()
            .from(Mailbox::new(Some("Dr. Light"), "dr.light@example.com").unwrap())
            .to(Mailbox::new(Some("Megaman"), "megaman@example.com").unwrap())
            .to(Mailbox::new(Some("Roll"), "roll@example.com").unwrap())
            .subject("wish")
            .date(fixed_date())
    }

    fn header_names(raw: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(raw);
        text.split("\r\n\r\n")
            .next()
            .unwrap()
            .split("\r\n")
            .filter(|line| !line.starts_with(' '))
            .map(|line| line.split(':').next().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_base64_wrapping() {
        for text in &[RANDOM_TEXT_1, RANDOM_TEXT_2, RANDOM_TEXT_3] {
            let encoded = encode_base64_wrapped(text.as_bytes());
            let lines: Vec<&str> = encoded.split("\r\n").collect();
            let (last, full) = lines.split_last().unwrap();
            assert!(full.iter().all(|line| line.len() == BASE64_LINE_LENGTH));
            assert!(!last.is_empty() && last.len() <= BASE64_LINE_LENGTH);
            assert_eq!(
                base64::decode(encoded.replace("\r\n", "")).unwrap(),
                text.as_bytes()
            );
        }
        assert_eq!(encode_base64_wrapped(b""), "");
    }

    #[test]
    fn test_header_order() {
        let message = builder()
            .cc(Mailbox::new(None::<String>, "rush@example.com").unwrap())
            .text(TEXT)
            .build()
            .unwrap();
        let email = MimeEncoder::with_seed(1).encode(&message).unwrap();
        assert_eq!(
            header_names(email.message()),
            [
                "From",
                "To",
                "Cc",
                "Subject",
                "Message-Id",
                "Date",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding"
            ]
        );
    }

    #[test]
    fn test_generated_message_id() {
        let message = builder().text(TEXT).build().unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        assert!(email.message_id().starts_with('<'));
        assert!(email.message_id().ends_with("@example.com>"));
        assert_eq!(header_message_id(email.message()).unwrap(), email.message_id());
    }

    #[test]
    fn test_supplied_message_id() {
        let message = builder()
            .text(TEXT)
            .message_id("<wish.1@light-labs.example>")
            .build()
            .unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        assert_eq!(email.message_id(), "<wish.1@light-labs.example>");
        assert_eq!(
            header_message_id(email.message()).unwrap(),
            "<wish.1@light-labs.example>"
        );
    }

    #[test]
    fn test_deterministic_with_seed() {
        let message = builder()
            .text(TEXT)
            .html(HTML)
            .attachment(Attachment::from_bytes("data.json", "application/json", "{}"))
            .build()
            .unwrap();
        let first = MimeEncoder::with_seed(7).encode(&message).unwrap();
        let second = MimeEncoder::with_seed(7).encode(&message).unwrap();
        assert_eq!(first.message(), second.message());
        assert_eq!(first.message_id(), second.message_id());
    }

    #[test]
    fn test_single_part_round_trip() {
        let message = builder().text(RANDOM_TEXT_2).build().unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        let parsed = mailparse::parse_mail(email.message()).unwrap();

        assert_eq!(parsed.ctype.mimetype, "text/plain");
        assert_eq!(parsed.get_body().unwrap(), RANDOM_TEXT_2);
        assert_eq!(parsed.headers.get_first_value("Subject").unwrap(), "wish");
        assert_eq!(
            parsed.headers.get_first_value("To").unwrap(),
            "\"Megaman\" <megaman@example.com>, \"Roll\" <roll@example.com>"
        );

        let body = String::from_utf8_lossy(email.message());
        let body = body.split("\r\n\r\n").nth(1).unwrap();
        assert_eq!(body, format!("{}\r\n", encode_base64_wrapped(RANDOM_TEXT_2.as_bytes())));
    }

    #[test]
    fn test_multipart_round_trip() {
        let image = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3, 255];
        let data = br#"{"key": "hello world"}"#.to_vec();
        let message = builder()
            .subject("Überraschung für Roll")
            .text(TEXT)
            .html(HTML)
            .attachment(Attachment::from_bytes("x.png", "image/png", image.clone()).inline("robots"))
            .attachment(Attachment::from_bytes("data.json", "application/json", data.clone()))
            .build()
            .unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        let parsed = mailparse::parse_mail(email.message()).unwrap();

        assert_eq!(
            parsed.headers.get_first_value("Subject").unwrap(),
            "Überraschung für Roll"
        );
        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        assert_eq!(parsed.subparts.len(), 2);

        let related = &parsed.subparts[0];
        assert_eq!(related.ctype.mimetype, "multipart/related");
        let alternative = &related.subparts[0];
        assert_eq!(alternative.ctype.mimetype, "multipart/alternative");
        assert_eq!(alternative.subparts[0].get_body().unwrap(), TEXT);
        assert_eq!(alternative.subparts[1].ctype.mimetype, "text/html");
        assert_eq!(alternative.subparts[1].get_body().unwrap(), HTML);

        let inline = &related.subparts[1];
        assert_eq!(inline.ctype.mimetype, "image/png");
        assert_eq!(inline.get_body_raw().unwrap(), image);
        assert_eq!(
            inline.headers.get_first_value("Content-ID").unwrap(),
            "<robots>"
        );

        let attachment = &parsed.subparts[1];
        assert_eq!(attachment.ctype.mimetype, "application/json");
        assert_eq!(attachment.get_body_raw().unwrap(), data);
        assert_eq!(
            attachment
                .get_content_disposition()
                .params
                .get("filename")
                .map(String::as_str),
            Some("data.json")
        );
    }

    #[test]
    fn test_base64_lines_in_payload() {
        let message = builder()
            .text(RANDOM_TEXT_1)
            .attachment(Attachment::from_bytes(
                "random.txt",
                "text/plain",
                RANDOM_TEXT_3,
            ))
            .build()
            .unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        let payload = String::from_utf8(email.into_message()).unwrap();
        for expected in &[RANDOM_TEXT_1, RANDOM_TEXT_3] {
            assert!(payload.contains(&encode_base64_wrapped(expected.as_bytes())));
        }
        assert!(payload.split("\r\n").all(|line| line.len() <= 998));
    }

    #[test]
    fn test_bcc_not_in_headers() {
        let message = builder()
            .bcc(Mailbox::new(None::<String>, "wily@example.com").unwrap())
            .text(TEXT)
            .build()
            .unwrap();
        let email = MimeEncoder::new().encode(&message).unwrap();
        assert!(!String::from_utf8_lossy(email.message()).contains("wily"));
        assert!(email
            .envelope()
            .to()
            .iter()
            .any(|address| address.to_string() == "wily@example.com"));
    }

    #[test]
    fn test_control_characters_stay_inside_headers() {
        // a mailbox that skipped validation, e.g. deserialized
        let forged = Mailbox {
            name: Some("Light\r\nBcc: wily@evil.example".to_string()),
            email: "dr.light@example.com".parse().unwrap(),
        };
        let message = Message::builder()
            .from(forged)
            .to(Mailbox::new(Some("Megaman"), "megaman@example.com").unwrap())
            .subject("wish\r\nX-Injected: yes")
            .date(fixed_date())
            .text(TEXT)
            .build()
            .unwrap();
        let email = MimeEncoder::with_seed(3).encode(&message).unwrap();

        let names = header_names(email.message());
        assert!(!names.iter().any(|name| name == "Bcc" || name == "X-Injected"));

        let parsed = mailparse::parse_mail(email.message()).unwrap();
        assert!(parsed.headers.get_first_value("Bcc").is_none());
        assert!(parsed
            .headers
            .get_first_value("From")
            .unwrap()
            .ends_with("<dr.light@example.com>"));
        assert_eq!(parsed.get_body().unwrap(), TEXT);
    }

    #[test]
    fn test_unreadable_attachment_aborts() {
        let message = builder()
            .text(TEXT)
            .attachment(Attachment::from_path("/nonexistent/x.png", None))
            .build()
            .unwrap();
        assert!(matches!(
            MimeEncoder::new().encode(&message),
            Err(Error::AttachmentUnreadable { .. })
        ));
    }

    #[test]
    fn test_fold() {
        let value = vec!["\"Robot Master\" <robot@example.com>,"; 5].join(" ");
        let folded = fold(4, &value);
        let mut lines = folded.split("\r\n");
        assert!(lines.next().unwrap().len() + 4 <= HEADER_LINE_LENGTH);
        assert!(lines.all(|line| line.len() <= HEADER_LINE_LENGTH));
        assert_eq!(folded.replace("\r\n", ""), value);
    }

    #[test]
    fn test_encode_words() {
        assert_eq!(encode_words("wish"), "wish");
        let encoded = encode_words("Überraschung");
        assert_eq!(encoded, "=?utf-8?b?w5xiZXJyYXNjaHVuZw==?=");
        let long = "ü".repeat(40);
        assert!(encode_words(&long).split(' ').all(|word| word.len() <= 75));
    }
}
