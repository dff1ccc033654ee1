//! WAV encoding via `hound`.

use std::io::Cursor;

use super::{AudioEncoder, AudioError, Recording};

/// Encodes a [`Recording`] as a mono 16-bit PCM WAV blob, ready to upload to
/// the transcription endpoint.
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn encode(&self, recording: &Recording) -> Result<Vec<u8>, AudioError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: recording.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
            for &sample in &recording.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| AudioError::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_riff_wav_header() {
        let recording = Recording {
            samples: vec![0i16; 1600],
            sample_rate: 16_000,
        };
        let blob = WavEncoder.encode(&recording).unwrap();

        assert_eq!(&blob[0..4], b"RIFF");
        assert_eq!(&blob[8..12], b"WAVE");
        // 44-byte header + 2 bytes per sample.
        assert_eq!(blob.len(), 44 + 1600 * 2);
    }

    #[test]
    fn empty_recording_still_encodes() {
        let recording = Recording {
            samples: Vec::new(),
            sample_rate: 44_100,
        };
        let blob = WavEncoder.encode(&recording).unwrap();
        assert_eq!(blob.len(), 44);
    }
}
