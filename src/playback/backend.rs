// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::time::Instant;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::PlaybackError;

/// The audio output the playback controller drives
///
/// Holds at most one loaded media file. Positions are milliseconds.
pub trait AudioBackend: Send {
    /// Replace whatever is loaded with the file at `path`, stopped at zero
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError>;
    /// Start the loaded media from the beginning
    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    /// Stop and unload
    fn halt(&mut self);
    fn seek(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    /// Length of the loaded media, if the container declares it
    fn duration_ms(&self) -> Option<u64>;
    /// Loaded, started, not paused and not yet at the end
    fn is_playing(&self) -> bool;
}

/// Open `path` and return the duration of its first audio track
pub fn read_duration(path: &Path) -> Result<Option<u64>, PlaybackError> {
    let file = std::fs::File::open(path).map_err(|e| PlaybackError::OpenFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let opened = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PlaybackError::Unsupported {
            path: path.to_path_buf(),
            source: e,
        })?;

    let track = opened
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::NoAudioTrack(path.to_path_buf()))?;
    let params = &track.codec_params;

    let duration = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(frames), Some(time_base), _) => {
            let time = time_base.calc_time(frames);
            Some(time.seconds * 1000 + (time.frac * 1000.0) as u64)
        }
        (Some(frames), None, Some(rate)) if rate > 0 => Some(frames * 1000 / u64::from(rate)),
        _ => None,
    };

    Ok(duration)
}

/// A backend without a sound device
///
/// Media is validated and measured with symphonia; the playhead follows a
/// monotonic clock.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    loaded: bool,
    duration_ms: Option<u64>,
    /// Playhead at the last start, seek or pause
    offset_ms: u64,
    /// Set while running
    started_at: Option<Instant>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        match self.duration_ms {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        }
    }
}

impl AudioBackend for HeadlessBackend {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError> {
        self.halt();
        self.duration_ms = read_duration(path)?;
        self.loaded = true;
        debug!("Loaded {} ({:?} ms)", path.display(), self.duration_ms);
        Ok(())
    }

    fn play(&mut self) {
        if self.loaded {
            self.offset_ms = 0;
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if self.started_at.is_some() {
            self.offset_ms = self.position_ms();
            self.started_at = None;
        }
    }

    fn resume(&mut self) {
        if self.loaded && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn halt(&mut self) {
        *self = Self::default();
    }

    fn seek(&mut self, position_ms: u64) {
        if !self.loaded {
            return;
        }
        self.offset_ms = self.clamp(position_ms);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn position_ms(&self) -> u64 {
        let running = self
            .started_at
            .map_or(0, |started| started.elapsed().as_millis() as u64);
        self.clamp(self.offset_ms + running)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn is_playing(&self) -> bool {
        self.loaded
            && self.started_at.is_some()
            && self
                .duration_ms
                .is_none_or(|duration| self.position_ms() < duration)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A mono 16-bit PCM WAV file of `duration_ms` silence at 8 kHz
    pub(crate) fn silent_wav(duration_ms: u32) -> Vec<u8> {
        let sample_rate: u32 = 8_000;
        let data_len = sample_rate * duration_ms / 1000 * 2;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(wav.len() + data_len as usize, 0);
        wav
    }

    #[test]
    fn reads_wav_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, silent_wav(1_500)).unwrap();

        assert_eq!(read_duration(&path).unwrap(), Some(1_500));
    }

    #[test]
    fn load_rejects_missing_file() {
        let dir = tempdir().unwrap();
        let mut backend = HeadlessBackend::new();

        let result = backend.load(&dir.path().join("absent.mp3"));

        assert!(matches!(result, Err(PlaybackError::OpenFailed { .. })));
        assert!(!backend.is_playing());
    }

    #[test]
    fn load_rejects_undecodable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"definitely not audio").unwrap();
        let mut backend = HeadlessBackend::new();

        assert!(matches!(
            backend.load(&path),
            Err(PlaybackError::Unsupported { .. })
        ));
    }

    #[test]
    fn seek_pause_and_halt_move_the_playhead() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, silent_wav(10_000)).unwrap();
        let mut backend = HeadlessBackend::new();

        backend.load(&path).unwrap();
        assert!(!backend.is_playing());

        backend.play();
        assert!(backend.is_playing());

        backend.seek(4_000);
        backend.pause();
        let paused_at = backend.position_ms();
        assert!((4_000..5_000).contains(&paused_at));
        assert!(!backend.is_playing());

        backend.seek(60_000);
        assert_eq!(backend.position_ms(), 10_000);

        backend.halt();
        assert_eq!(backend.position_ms(), 0);
        assert_eq!(backend.duration_ms(), None);
    }
}
