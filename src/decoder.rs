//! Wire-line decoding for the board's `TAG:VALUE` ASCII protocol.
//!
//! The board emits one datum per line, terminated by `\n` (with an optional
//! preceding `\r`). Two kinds of lines exist: sensor readings (`TEMP:12.5`)
//! and status chatter (`OK:...`, `INFO:...`, `ERROR:...`, `DEBUG:...`).
//! Anything else is malformed and reported as [`DaqError::Decode`] so the
//! caller can count and drop it without disturbing the stream.
//!
//! Historical quirk: the original firmware labels the ultrasonic distance
//! reading `TEMP:` and the photoresistor percentage `intensidad lumínica:`.
//! Both legacy tags are accepted alongside the saner `DIST:`/`LUX:`/`TC:`
//! tags of later firmware so either board revision works unmodified.

use crate::core::{Channel, Reading, StatusEvent};
use crate::error::DaqError;

/// Inbound tag table. First match on the text before the first ':' wins.
const CHANNEL_TAGS: [(&str, Channel); 5] = [
    ("TEMP", Channel::Distance), // legacy firmware mislabel
    ("DIST", Channel::Distance),
    ("intensidad lumínica", Channel::Light),
    ("LUX", Channel::Intensity),
    ("TC", Channel::Temperature),
];

/// Longest line we will accumulate before declaring the stream garbled.
const MAX_LINE_BYTES: usize = 256;

/// Result of decoding one complete line.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Reading(Reading),
    Status(StatusEvent),
    /// Blank line; ignored.
    Empty,
}

/// Decode one complete line (without its terminator).
///
/// Invalid UTF-8 bytes are replaced rather than rejected; serial links
/// drop bits and a single mangled character should not kill the line's
/// neighbors in the tag.
pub fn decode_line(raw: &[u8]) -> Result<Decoded, DaqError> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return Ok(Decoded::Empty);
    }

    if let Some(rest) = line.strip_prefix("OK:") {
        return Ok(Decoded::Status(StatusEvent::Ok(rest.trim().to_string())));
    }
    if let Some(rest) = line.strip_prefix("INFO:") {
        return Ok(Decoded::Status(StatusEvent::Info(rest.trim().to_string())));
    }
    if let Some(rest) = line.strip_prefix("ERROR:") {
        return Ok(Decoded::Status(StatusEvent::Error(rest.trim().to_string())));
    }
    if let Some(rest) = line.strip_prefix("DEBUG:") {
        return Ok(Decoded::Status(StatusEvent::Debug(rest.trim().to_string())));
    }

    let Some((tag, payload)) = line.split_once(':') else {
        return Err(DaqError::Decode(format!("no tag separator in '{line}'")));
    };

    let tag = tag.trim();
    let Some(&(_, channel)) = CHANNEL_TAGS.iter().find(|(t, _)| *t == tag) else {
        return Err(DaqError::Decode(format!("unknown tag '{tag}'")));
    };

    let value: f64 = payload
        .trim()
        .parse()
        .map_err(|_| DaqError::Decode(format!("bad value '{}' for tag '{tag}'", payload.trim())))?;
    if !value.is_finite() {
        return Err(DaqError::Decode(format!(
            "non-finite value for tag '{tag}'"
        )));
    }

    Ok(Decoded::Reading(Reading::now(channel, value)))
}

/// Reassembles complete lines from arbitrary read chunks.
///
/// Serial reads return whatever happened to be in the OS buffer, so a
/// single `TEMP:12.5\n` may arrive split across several reads or glued to
/// its neighbors. `push` returns every line completed by the new bytes,
/// in arrival order, terminators stripped.
#[derive(Debug, Default)]
pub struct LineAccumulator {
    buf: Vec<u8>,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(std::mem::take(&mut self.buf));
            } else {
                self.buf.push(byte);
                if self.buf.len() > MAX_LINE_BYTES {
                    // Stream is garbled; drop the fragment and resync on
                    // the next newline.
                    self.buf.clear();
                }
            }
        }
        lines
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_reading(line: &str) -> Reading {
        match decode_line(line.as_bytes()) {
            Ok(Decoded::Reading(r)) => r,
            other => panic!("expected reading from '{line}', got {other:?}"),
        }
    }

    #[test]
    fn legacy_tags_map_to_channels() {
        let r = expect_reading("TEMP:12.5");
        assert_eq!(r.channel, Channel::Distance);
        assert!((r.value - 12.5).abs() < f64::EPSILON);

        let r = expect_reading("intensidad lumínica: 73.0");
        assert_eq!(r.channel, Channel::Light);
    }

    #[test]
    fn modern_tags_map_to_channels() {
        assert_eq!(expect_reading("DIST:99.1").channel, Channel::Distance);
        assert_eq!(expect_reading("LUX:480").channel, Channel::Intensity);
        assert_eq!(expect_reading("TC:21.3").channel, Channel::Temperature);
    }

    #[test]
    fn status_prefixes_never_become_readings() {
        assert_eq!(
            decode_line(b"OK:T1 set").unwrap(),
            Decoded::Status(StatusEvent::Ok("T1 set".into()))
        );
        assert_eq!(
            decode_line(b"ERROR:bad value").unwrap(),
            Decoded::Status(StatusEvent::Error("bad value".into()))
        );
        // INFO payloads can contain colons (STATUS echo).
        assert_eq!(
            decode_line(b"INFO:STATUS:T1=1,T2=1").unwrap(),
            Decoded::Status(StatusEvent::Info("STATUS:T1=1,T2=1".into()))
        );
    }

    #[test]
    fn malformed_lines_are_errors_not_panics() {
        assert!(matches!(
            decode_line(b"garbage"),
            Err(DaqError::Decode(_))
        ));
        assert!(matches!(
            decode_line(b"FOO:1.0"),
            Err(DaqError::Decode(_))
        ));
        assert!(matches!(
            decode_line(b"TEMP:abc"),
            Err(DaqError::Decode(_))
        ));
        assert!(matches!(decode_line(b"TEMP:inf"), Err(DaqError::Decode(_))));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(decode_line(b"").unwrap(), Decoded::Empty);
        assert_eq!(decode_line(b"\r").unwrap(), Decoded::Empty);
    }

    #[test]
    fn stream_survives_interleaved_garbage() {
        // One bad line must not poison its neighbors.
        let lines = ["TEMP:12.5", "garbage", "TEMP:abc", "TEMP:13.0"];
        let mut good = Vec::new();
        let mut bad = 0;
        for line in lines {
            match decode_line(line.as_bytes()) {
                Ok(Decoded::Reading(r)) => good.push(r.value),
                Ok(_) => {}
                Err(_) => bad += 1,
            }
        }
        assert_eq!(good, vec![12.5, 13.0]);
        assert_eq!(bad, 2);
    }

    #[test]
    fn accumulator_reassembles_split_reads() {
        let mut acc = LineAccumulator::new();
        assert!(acc.push(b"TEM").is_empty());
        assert!(acc.push(b"P:12").is_empty());
        let lines = acc.push(b".5\r\nDIST:4\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], b"TEMP:12.5\r".to_vec());
        assert_eq!(lines[1], b"DIST:4".to_vec());
    }

    #[test]
    fn accumulator_drops_oversized_fragment() {
        let mut acc = LineAccumulator::new();
        acc.push(&[b'x'; 1_000]);
        // After resync, normal lines come through clean.
        let lines = acc.push(b"\nTEMP:1\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], b"TEMP:1".to_vec());
    }
}
