// CallButton — Voice Recorder
//
// Long-press-to-talk capture pipeline. A worker thread pulls 1024-sample
// chunks from the capture source into a PCM buffer sized for the maximum
// clip; stop() joins the worker and ADPCM-encodes the whole take in one
// pass. Both buffers are allocated once at boot and reused for every clip —
// a 20 s take needs 640 KiB of PCM and the S3's internal heap cannot absorb
// that churn per recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context, Result};

use crate::adpcm::{self, AdpcmState};
use crate::config;

/// Anything that can produce signed 16-bit mono PCM on demand. The hardware
/// implementation wraps the I2S microphone driver.
pub trait CaptureSource: Send {
    fn start(&mut self) -> Result<()>;
    /// Fill `buf`, returning the number of samples written. Blocks up to the
    /// driver timeout; 0 means no data this round, not end-of-stream.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;
    fn stop(&mut self) -> Result<()>;
}

/// A finished, compressed recording. Borrows the recorder's encode buffer,
/// so the clip must be published (or dropped) before the next take starts —
/// no per-clip copy of up to 160 KiB.
#[derive(Debug, Clone, Copy)]
pub struct VoiceClip<'a> {
    pub adpcm: &'a [u8],
    pub samples: usize,
    pub sample_rate: u32,
}

impl VoiceClip<'_> {
    pub fn duration_secs(&self) -> f32 {
        self.samples as f32 / self.sample_rate as f32
    }
}

struct CaptureBuffers {
    pcm: Vec<i16>,
    filled: usize,
    capture_failed: bool,
}

struct Shared {
    recording: AtomicBool,
    buffers: Mutex<CaptureBuffers>,
}

pub struct AudioRecorder<S: CaptureSource + 'static> {
    source: Option<S>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<S>>,
    adpcm_out: Vec<u8>,
    sample_rate: u32,
}

impl<S: CaptureSource + 'static> AudioRecorder<S> {
    pub fn new(source: S, sample_rate: u32, max_duration_sec: u32) -> Self {
        let capacity = (sample_rate * max_duration_sec) as usize;
        Self {
            source: Some(source),
            shared: Arc::new(Shared {
                recording: AtomicBool::new(false),
                buffers: Mutex::new(CaptureBuffers {
                    pcm: vec![0i16; capacity],
                    filled: 0,
                    capture_failed: false,
                }),
            }),
            worker: None,
            adpcm_out: vec![0u8; (capacity + 1) / 2],
            sample_rate,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::Acquire)
    }

    /// Begin capturing into the (reset) PCM buffer. Fails when a recording
    /// is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            bail!("recorder already running");
        }

        let mut source = self
            .source
            .take()
            .ok_or_else(|| anyhow!("capture source unavailable"))?;

        {
            let mut buf = self.shared.buffers.lock().unwrap();
            buf.pcm.fill(0);
            buf.filled = 0;
            buf.capture_failed = false;
        }

        source.start().context("starting capture source")?;
        self.shared.recording.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let worker = std::thread::Builder::new()
            .name("audio_rec".into())
            .stack_size(config::STACK_AUDIO)
            .spawn(move || capture_loop(source, shared))
            .context("spawning audio worker")?;
        self.worker = Some(worker);

        log::info!("Recording started");
        Ok(())
    }

    /// Stop capturing and compress the take. Returns `None` when nothing was
    /// recorded or the capture failed mid-take.
    pub fn stop(&mut self) -> Result<Option<VoiceClip<'_>>> {
        if !self.is_recording() && self.worker.is_none() {
            return Ok(None);
        }

        self.shared.recording.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => bail!("audio worker panicked"),
            }
        }

        let buf = self.shared.buffers.lock().unwrap();
        if buf.capture_failed {
            log::warn!("Recording discarded: capture error mid-take");
            return Ok(None);
        }
        if buf.filled == 0 {
            log::warn!("Recording discarded: no samples captured");
            return Ok(None);
        }

        let mut state = AdpcmState::new();
        let bytes = adpcm::encode(&buf.pcm[..buf.filled], &mut self.adpcm_out, &mut state);
        let samples = buf.filled;
        drop(buf);

        let clip = VoiceClip {
            adpcm: &self.adpcm_out[..bytes],
            samples,
            sample_rate: self.sample_rate,
        };
        log::info!(
            "Recording stopped: {} samples ({:.2}s) -> {} bytes ADPCM",
            clip.samples,
            clip.duration_secs(),
            bytes
        );
        Ok(Some(clip))
    }

    /// Drop the take without encoding it.
    pub fn discard(&mut self) -> Result<()> {
        self.shared.recording.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => bail!("audio worker panicked"),
            }
        }
        self.shared.buffers.lock().unwrap().filled = 0;
        Ok(())
    }
}

/// Worker body: read chunks until told to stop or the buffer is full. The
/// source is returned to the recorder through the join handle.
fn capture_loop<S: CaptureSource>(mut source: S, shared: Arc<Shared>) -> S {
    let mut chunk = vec![0i16; config::AUDIO_CHUNK_SAMPLES];

    while shared.recording.load(Ordering::Acquire) {
        let n = match source.read(&mut chunk) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Audio capture failed: {e:?}");
                shared.buffers.lock().unwrap().capture_failed = true;
                shared.recording.store(false, Ordering::Release);
                break;
            }
        };

        if n == 0 {
            continue;
        }

        let mut buf = shared.buffers.lock().unwrap();
        let room = buf.pcm.len() - buf.filled;
        let take = n.min(room);
        let filled = buf.filled;
        buf.pcm[filled..filled + take].copy_from_slice(&chunk[..take]);
        buf.filled += take;

        // Buffer full: capacity stop, the coordinator's deadline check will
        // close the session. Keep the take, it is a complete maximum-length
        // clip.
        if buf.filled == buf.pcm.len() {
            drop(buf);
            shared.recording.store(false, Ordering::Release);
            break;
        }
    }

    if let Err(e) = source.stop() {
        log::warn!("Capture source stop failed: {e:?}");
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic ramp source for driving the recorder off-hardware.
    struct RampSource {
        next: i16,
        started: bool,
    }

    impl RampSource {
        fn new() -> Self {
            Self {
                next: 0,
                started: false,
            }
        }
    }

    impl CaptureSource for RampSource {
        fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
            assert!(self.started);
            for s in buf.iter_mut() {
                *s = self.next;
                self.next = self.next.wrapping_add(3);
            }
            Ok(buf.len())
        }

        fn stop(&mut self) -> Result<()> {
            self.started = false;
            Ok(())
        }
    }

    struct FailingSource {
        reads_before_failure: usize,
    }

    impl CaptureSource for FailingSource {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
            if self.reads_before_failure == 0 {
                bail!("i2s bus fault");
            }
            self.reads_before_failure -= 1;
            Ok(buf.len())
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn capacity_stop_yields_exactly_max_samples() {
        // 1 second cap at 16 kHz: the ramp source never stops on its own, so
        // the worker must stop at precisely the buffer capacity.
        let mut rec = AudioRecorder::new(RampSource::new(), 16_000, 1);
        rec.start().unwrap();

        // Ramp source is unpaced, so the cap is reached almost instantly.
        while rec.is_recording() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let clip = rec.stop().unwrap().expect("clip");
        assert_eq!(clip.samples, 16_000);
        assert_eq!(clip.adpcm.len(), 8_000);
        assert!((clip.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut rec = AudioRecorder::new(RampSource::new(), 16_000, 1);
        rec.start().unwrap();
        assert!(rec.start().is_err());
        rec.discard().unwrap();
    }

    #[test]
    fn recorder_is_reusable_after_stop() {
        let mut rec = AudioRecorder::new(RampSource::new(), 16_000, 1);

        rec.start().unwrap();
        while rec.is_recording() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let first_samples = rec.stop().unwrap().expect("clip").samples;

        rec.start().unwrap();
        while rec.is_recording() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let second = rec.stop().unwrap().expect("clip");

        assert_eq!(second.samples, first_samples);
    }

    #[test]
    fn clip_borrows_the_preallocated_encode_buffer() {
        let mut rec = AudioRecorder::new(RampSource::new(), 16_000, 1);
        rec.start().unwrap();
        while rec.is_recording() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let out_ptr = rec.adpcm_out.as_ptr();
        let clip = rec.stop().unwrap().expect("clip");
        assert_eq!(clip.adpcm.as_ptr(), out_ptr);
    }

    #[test]
    fn capture_failure_discards_the_take() {
        let mut rec = AudioRecorder::new(
            FailingSource {
                reads_before_failure: 2,
            },
            16_000,
            1,
        );
        rec.start().unwrap();
        while rec.is_recording() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(rec.stop().unwrap().is_none());
    }

    #[test]
    fn stop_without_start_is_a_clean_none() {
        let mut rec = AudioRecorder::new(RampSource::new(), 16_000, 1);
        assert!(rec.stop().unwrap().is_none());
    }
}
