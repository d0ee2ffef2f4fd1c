//! Checks for the `format` keyword.
//!
//! The email and hostname grammars are narrower than the full
//! RFC grammars. Unknown format names are not represented here; the compiler
//! ignores them.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;

/// Longest accepted email address or hostname, in bytes.
const MAX_NAME_LENGTH: usize = 255;

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-5][0-9]:[0-5][0-9](\.[0-9]+)?(Z|[+-][0-9]{2}:[0-5][0-9])$",
    )
    .expect("static regex must compile")
});

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{0,62}(\.[A-Za-z0-9][A-Za-z0-9-]{0,62})*$")
        .expect("static regex must compile")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*",
        r"@[A-Za-z0-9][A-Za-z0-9-]{0,62}(\.[A-Za-z0-9][A-Za-z0-9-]{0,62})*$",
    ))
    .expect("static regex must compile")
});

/// A supported `format` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    DateTime,
    Email,
    Hostname,
    Ipv4,
    Ipv6,
    Uri,
}

impl Format {
    /// Maps a `format` keyword value to a checker; `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "date-time" => Some(Format::DateTime),
            "email" => Some(Format::Email),
            "hostname" => Some(Format::Hostname),
            "ipv4" => Some(Format::Ipv4),
            "ipv6" => Some(Format::Ipv6),
            "uri" => Some(Format::Uri),
            _ => None,
        }
    }

    /// Returns `true` if `value` conforms to this format.
    ///
    /// # Examples
    ///
    /// ```
    /// use stream_schema_core::Format;
    ///
    /// assert!(Format::DateTime.check("2024-02-29T12:00:00Z"));
    /// assert!(!Format::DateTime.check("2023-02-29T12:00:00Z"));
    /// assert!(Format::Hostname.check("example.com"));
    /// assert!(!Format::Ipv4.check("256.0.0.1"));
    /// ```
    pub fn check(self, value: &str) -> bool {
        match self {
            Format::DateTime => is_date_time(value),
            Format::Email => value.len() <= MAX_NAME_LENGTH && EMAIL_RE.is_match(value),
            Format::Hostname => value.len() <= MAX_NAME_LENGTH && HOSTNAME_RE.is_match(value),
            Format::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
            Format::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
            Format::Uri => is_uri(value),
        }
    }
}

fn two_digits(bytes: &[u8], at: usize) -> u32 {
    u32::from(bytes[at] - b'0') * 10 + u32::from(bytes[at + 1] - b'0')
}

/// RFC 3339 `date-time` with calendar validation of the date and the hour.
fn is_date_time(value: &str) -> bool {
    if !DATE_TIME_RE.is_match(value) {
        return false;
    }
    // The regex guarantees ASCII digits at every position read below.
    let bytes = value.as_bytes();
    let year = two_digits(bytes, 0) * 100 + two_digits(bytes, 2);
    let month = two_digits(bytes, 5);
    let day = two_digits(bytes, 8);
    let hour = two_digits(bytes, 11);

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return false;
    }
    if hour >= 24 {
        return false;
    }
    if !value.ends_with('Z') {
        let offset_hour = two_digits(bytes, bytes.len() - 5);
        if offset_hour >= 24 {
            return false;
        }
    }
    true
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Absolute URI: RFC 3986 character repertoire, then a structural parse.
fn is_uri(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let valid_escape = bytes
                .get(i + 1..i + 3)
                .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
            if !valid_escape {
                return false;
            }
            i += 3;
            continue;
        }
        let allowed = b.is_ascii_alphanumeric() || b"-._~:/?#[]@!$&'()*+,;=".contains(&b);
        if !allowed {
            return false;
        }
        i += 1;
    }
    url::Url::parse(value).is_ok()
}
