//! Stream profile detection.
//!
//! Compressed streams carry no magic number. M0 and M2 streams end their
//! checksum recurrence at a fixed value and M3 streams frame their body
//! with two size fields that must agree with the stream length, so a
//! stream can be matched against each profile without decoding it.

use epcompress_core::error::Result;
use epcompress_core::traits::Profile;
use std::io::Read;

/// Check whether `stream` is structurally valid for `profile`.
///
/// A `true` result only means the integrity data agrees; the token stream
/// itself may still be damaged.
pub fn is_plausible(profile: Profile, stream: &[u8]) -> bool {
    match profile.format().checksum {
        Some(checksum) => !stream.is_empty() && checksum.verify(stream).is_ok(),
        None => m3_frame_ok(stream),
    }
}

fn m3_frame_ok(stream: &[u8]) -> bool {
    let n = stream.len();
    if n < 4 {
        return false;
    }
    let body_len = u16::from_le_bytes([stream[0], stream[1]]) as usize;
    let extra = u16::from_le_bytes([stream[n - 2], stream[n - 1]]) as usize;
    body_len + 4 == n && (1..=0xFFFF).contains(&(body_len + extra))
}

/// Profiles whose integrity data matches `stream`, in detection order.
pub fn candidates(stream: &[u8]) -> Vec<Profile> {
    Profile::DETECTION_ORDER
        .into_iter()
        .filter(|&profile| is_plausible(profile, stream))
        .collect()
}

/// Read a whole stream and report its most likely profile.
///
/// Returns the stream contents together with the first candidate, or
/// `None` if no profile matches.
pub fn detect<R: Read>(reader: &mut R) -> Result<(Option<Profile>, Vec<u8>)> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let profile = candidates(&data).first().copied();
    Ok((profile, data))
}

/// Name of the integrity check a profile uses.
pub fn integrity_check(profile: Profile) -> &'static str {
    match profile.format().checksum {
        Some(_) => "checksum byte",
        None => "size fields",
    }
}
