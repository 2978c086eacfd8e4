//! Decode backend selection.
//!
//! Two backends are known at design time: `hound` for plain wav containers and
//! `symphonia` for everything else. Selection sniffs the container magic;
//! callers may force a backend through [`crate::decoder::DecodeOptions`].

use serde::{Deserialize, Serialize};

/// Closed set of decode backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackendKind {
    /// Plain RIFF/WAVE via `hound`.
    Wav,
    /// Compressed and exotic containers via `symphonia`.
    Symphonia,
}

/// Pick a backend for the byte container by sniffing its magic.
pub(crate) fn sniff(bytes: &[u8]) -> DecoderBackendKind {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        DecoderBackendKind::Wav
    } else {
        DecoderBackendKind::Symphonia
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_recognizes_riff_wave() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WAVE");
        assert_eq!(sniff(&bytes), DecoderBackendKind::Wav);
    }

    #[test]
    fn sniff_defaults_to_symphonia() {
        assert_eq!(sniff(b"OggS junk"), DecoderBackendKind::Symphonia);
        assert_eq!(sniff(&[]), DecoderBackendKind::Symphonia);
    }
}
