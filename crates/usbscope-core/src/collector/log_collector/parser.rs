//! Kernel log line parser.
//!
//! Lines come from `journalctl -o short`:
//!
//! ```text
//! Oct 18 10:00:01 host kernel: usb 1-2: new high-speed USB device number 5 using xhci_hcd
//! ```
//!
//! Field extraction is positional and best-effort: the first three
//! whitespace-separated tokens form the timestamp, the fourth the source,
//! the rest the message. Classification is a case-insensitive keyword scan
//! over the whole line. Any input, including an empty one, yields an
//! [`Event`].

use crate::model::{Event, Level};

/// Subsystem recorded on every event read from the kernel ring buffer.
pub const KERNEL_SUBSYSTEM: &str = "kernel";

/// Keywords marking a line as USB related.
pub const USB_KEYWORDS: &[&str] = &["usb", "xhci", "usbhid", "hub"];

/// Keywords marking a line as an error.
pub const ERROR_KEYWORDS: &[&str] = &["error", "fail", "timeout"];

/// Number of leading tokens that make up the timestamp.
const TIMESTAMP_TOKENS: usize = 3;

/// Parse one raw log line into an event.
pub fn parse_line(line: &str) -> Event {
    let line = line.trim();
    let mut rest = line;

    for _ in 0..TIMESTAMP_TOKENS {
        match next_token(rest) {
            Some((_, tail)) => rest = tail,
            None => break,
        }
    }
    // Sliced from the line so padded days ("Oct  8") keep their spacing.
    let timestamp = &line[..line.len() - rest.len()];

    let source = match next_token(rest) {
        Some((token, tail)) => {
            rest = tail;
            token
        }
        None => "",
    };
    let message = rest.trim();

    let lowered = line.to_lowercase();
    let is_usb = contains_any(&lowered, USB_KEYWORDS);
    let is_error = contains_any(&lowered, ERROR_KEYWORDS);

    Event {
        timestamp: timestamp.to_string(),
        level: if is_error { Level::Error } else { Level::Info },
        subsystem: KERNEL_SUBSYSTEM.to_string(),
        source: source.to_string(),
        message: message.to_string(),
        is_usb,
        is_error,
        device_id: extract_bus_id(message).unwrap_or_default().to_string(),
    }
}

/// Split off the first whitespace-delimited token.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Find the bus id in the kernel's `usb <busid>: ...` device prefix.
///
/// Bus ids are `<bus>-<port>[.<port>...]`, e.g. `1-2` or `3-1.4`.
fn extract_bus_id(message: &str) -> Option<&str> {
    let mut tokens = message.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "usb" {
            continue;
        }
        let candidate = tokens.next()?.strip_suffix(':')?;
        let is_bus_id = candidate.contains('-')
            && candidate.starts_with(|c: char| c.is_ascii_digit())
            && candidate
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-' || c == '.');
        if is_bus_id {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_format_line() {
        let line = "Oct 18 10:00:01 thinkpad kernel: usb 1-2: new high-speed USB device number 5 using xhci_hcd";
        let event = parse_line(line);

        assert_eq!(event.timestamp, "Oct 18 10:00:01");
        assert_eq!(event.source, "thinkpad");
        assert_eq!(
            event.message,
            "kernel: usb 1-2: new high-speed USB device number 5 using xhci_hcd"
        );
        assert_eq!(event.subsystem, "kernel");
        assert!(event.is_usb);
        assert!(!event.is_error);
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.device_id, "1-2");
    }

    #[test]
    fn test_xhci_timeout_is_usb_error() {
        let event = parse_line("XHCI: Timeout reading register");
        assert!(event.is_usb);
        assert!(event.is_error);
        assert_eq!(event.level, Level::Error);
    }

    #[test]
    fn test_systemd_line_is_plain_info() {
        let event = parse_line("systemd[1]: Started foo.service");
        assert!(!event.is_usb);
        assert!(!event.is_error);
        assert_eq!(event.level, Level::Info);
    }

    #[test]
    fn test_empty_line_yields_default_fields() {
        let event = parse_line("");
        assert_eq!(event.timestamp, "");
        assert_eq!(event.source, "");
        assert_eq!(event.message, "");
        assert_eq!(event.device_id, "");
        assert!(!event.is_usb);
        assert!(!event.is_error);
        assert_eq!(event.level, Level::Info);
    }

    #[test]
    fn test_short_line_fills_what_it_can() {
        let event = parse_line("Oct 18");
        assert_eq!(event.timestamp, "Oct 18");
        assert_eq!(event.source, "");
        assert_eq!(event.message, "");
    }

    #[test]
    fn test_padded_day_keeps_source_spacing() {
        let event = parse_line("Oct  8 09:15:00 host kernel: hub 1-0:1.0: USB hub found");
        assert_eq!(event.timestamp, "Oct  8 09:15:00");
        assert_eq!(event.source, "host");
        assert_eq!(event.message, "kernel: hub 1-0:1.0: USB hub found");
        assert!(event.is_usb);
    }

    #[test]
    fn test_message_keeps_inner_spacing() {
        let event = parse_line("2024-05-01T10:00:00+0200 a b host kernel:  two  spaces");
        assert_eq!(event.message, "kernel:  two  spaces");
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let event = parse_line("Oct 18 10:00:01 host kernel: usbhid 3-1:1.0: FAILED to enable");
        assert!(event.is_usb);
        assert!(event.is_error);
    }

    #[test]
    fn test_error_keyword_substring() {
        // "failure" contains "fail"
        let event = parse_line("Oct 18 10:00:01 host kernel: ACPI failure in _OSC");
        assert!(event.is_error);
        assert!(!event.is_usb);
    }

    #[test]
    fn test_extract_bus_id() {
        assert_eq!(
            extract_bus_id("kernel: usb 3-1.4: reset high-speed USB device"),
            Some("3-1.4")
        );
        assert_eq!(extract_bus_id("kernel: usb usb1-port2: over-current"), None);
        assert_eq!(extract_bus_id("kernel: usbcore: registered new driver"), None);
        assert_eq!(extract_bus_id("kernel: usb"), None);
    }
}
