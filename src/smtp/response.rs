//! SMTP response, containing a mandatory return code and an optional text
//! message

use std::fmt::{Display, Formatter, Result};
use std::result;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::streaming::{tag, take_until};
use nom::character::streaming::{crlf, one_of};
use nom::combinator::{map, value};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, terminated, tuple};
use nom::IResult;

/// First digit indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum Severity {
    /// 2yx
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

/// Second digit
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum Category {
    /// x0z
    Syntax = 0,
    /// x1z
    Information = 1,
    /// x2z
    Connections = 2,
    /// x3z
    Unspecified3 = 3,
    /// x4z
    Unspecified4 = 4,
    /// x5z
    MailSystem = 5,
}

/// The detail digit of a response code (third digit)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Detail(pub u8);

/// Represents a 3 digit SMTP response code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Code {
    /// First digit of the response code
    pub severity: Severity,
    /// Second digit of the response code
    pub category: Category,
    /// Third digit
    pub detail: Detail,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{}{}{}",
            self.severity as u8, self.category as u8, self.detail.0
        )
    }
}

impl Code {
    /// Creates a new `Code` structure
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }

    /// The code as a number, e.g. `250`
    pub fn value(&self) -> u16 {
        u16::from(self.severity as u8) * 100
            + u16::from(self.category as u8) * 10
            + u16::from(self.detail.0)
    }
}

/// Contains an SMTP reply, with separated code and message
///
/// The text message is optional, only the code is mandatory
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Response {
    /// Response code
    pub code: Code,
    /// Server response string (optional)
    /// Handle multiline responses
    pub message: Vec<String>,
}

impl FromStr for Response {
    type Err = nom::error::Error<String>;

    fn from_str(s: &str) -> result::Result<Response, nom::error::Error<String>> {
        match parse_response(s) {
            Ok((_, response)) => Ok(response),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(nom::error::Error::new(
                e.input.to_string(),
                e.code,
            )),
            Err(nom::Err::Incomplete(_)) => Err(nom::error::Error::new(
                s.to_string(),
                nom::error::ErrorKind::Complete,
            )),
        }
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.first_line() {
            Some(line) => write!(f, "{} {}", self.code, line),
            None => self.code.fmt(f),
        }
    }
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Tells if the response is positive
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        self.code.value() == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .get(0)
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns only the line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }
}

// Parsers (originally from tokio-smtp)

fn parse_code(i: &str) -> IResult<&str, Code> {
    let (i, severity) = parse_severity(i)?;
    let (i, category) = parse_category(i)?;
    let (i, detail) = parse_detail(i)?;
    Ok((
        i,
        Code {
            severity,
            category,
            detail,
        },
    ))
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        value(Severity::PositiveCompletion, tag("2")),
        value(Severity::PositiveIntermediate, tag("3")),
        value(Severity::TransientNegativeCompletion, tag("4")),
        value(Severity::PermanentNegativeCompletion, tag("5")),
    ))(i)
}

fn parse_category(i: &str) -> IResult<&str, Category> {
    alt((
        value(Category::Syntax, tag("0")),
        value(Category::Information, tag("1")),
        value(Category::Connections, tag("2")),
        value(Category::Unspecified3, tag("3")),
        value(Category::Unspecified4, tag("4")),
        value(Category::MailSystem, tag("5")),
    ))(i)
}

fn parse_detail(i: &str) -> IResult<&str, Detail> {
    map(one_of("0123456789"), |digit: char| {
        Detail(digit as u8 - b'0')
    })(i)
}

/// `code-text CRLF`
fn parse_continuation(i: &str) -> IResult<&str, (Code, &str)> {
    tuple((parse_code, delimited(tag("-"), take_until("\r\n"), crlf)))(i)
}

/// `code SP text CRLF`, or the bare code when there is no text
fn parse_last_line(i: &str) -> IResult<&str, (Code, &str)> {
    tuple((
        parse_code,
        terminated(
            alt((preceded(tag(" "), take_until("\r\n")), value("", tag("")))),
            crlf,
        ),
    ))(i)
}

/// Parses one (possibly multi-line) reply.
///
/// Returns `Incomplete` until the final line is in the buffer.
pub fn parse_response(i: &str) -> IResult<&str, Response> {
    let (i, lines) = many0(parse_continuation)(i)?;
    let (i, (last_code, last_line)) = parse_last_line(i)?;

    // Check that all codes are equal.
    if !lines.iter().all(|&(code, _)| code == last_code) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Verify,
        )));
    }

    // Extract text from lines, and append last line.
    let mut lines: Vec<String> = lines.into_iter().map(|(_, text)| text.to_string()).collect();
    lines.push(last_line.to_string());
    if lines.len() == 1 && lines[0].is_empty() {
        lines.clear();
    }

    Ok((
        i,
        Response {
            code: last_code,
            message: lines,
        },
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_severity_fmt() {
        assert_eq!(format!("{}", Severity::PositiveCompletion as u8), "2");
    }

    #[test]
    fn test_code_display() {
        let code = Code {
            severity: Severity::TransientNegativeCompletion,
            category: Category::Connections,
            detail: Detail(1),
        };

        assert_eq!(code.to_string(), "421");
        assert_eq!(code.value(), 421);
    }

    #[test]
    fn test_response_from_str() {
        let raw_response = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert_eq!(
            raw_response.parse::<Response>().unwrap(),
            Response {
                code: Code {
                    severity: Severity::PositiveCompletion,
                    category: Category::MailSystem,
                    detail: Detail(0),
                },
                message: vec![
                    "me".to_string(),
                    "8BITMIME".to_string(),
                    "SIZE 42".to_string(),
                    "AUTH PLAIN CRAM-MD5".to_string(),
                ],
            }
        );

        let wrong_code = "2506-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_code.parse::<Response>().is_err());

        let wrong_end = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250-AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_end.parse::<Response>().is_err());

        let mixed_codes = "250-me\r\n251 done\r\n";
        assert!(mixed_codes.parse::<Response>().is_err());
    }

    #[test]
    fn test_response_incomplete() {
        assert!(matches!(
            parse_response("250-me\r\n"),
            Err(nom::Err::Incomplete(_))
        ));
        assert!(matches!(parse_response("220 ready"), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn test_response_without_text() {
        let (rest, response) = parse_response("354\r\n").unwrap();
        assert!(rest.is_empty());
        assert!(response.has_code(354));
        assert!(response.message.is_empty());
        assert_eq!(response.first_line(), None);
    }

    #[test]
    fn test_response_is_positive() {
        assert!("250 ok\r\n".parse::<Response>().unwrap().is_positive());
        assert!("334 VXNlcm5hbWU6\r\n".parse::<Response>().unwrap().is_positive());
        assert!(!"421 closing\r\n".parse::<Response>().unwrap().is_positive());
        assert!(!"550 no such user\r\n".parse::<Response>().unwrap().is_positive());
    }

    #[test]
    fn test_response_first_word() {
        let response: Response = "250-me\r\n250-8BITMIME\r\n250 SIZE 42\r\n".parse().unwrap();
        assert_eq!(response.first_word(), Some("me"));
        assert_eq!(response.first_line(), Some("me"));
        assert_eq!(response.to_string(), "250 me");
    }
}
