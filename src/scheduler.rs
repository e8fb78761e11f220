//! `PlayerScheduler`: the cooperative playback state machine that turns
//! filesystem paths into a steady stream of register frames.
//!
//! `tick()` is meant to be called repeatedly from a host event loop (it is
//! not realtime-sensitive itself); it returns a suggested number of
//! microseconds to wait before calling again. `play`/`play_directory`/
//! `pause`/`resume`/`skip`/`stop` may be called from a different thread
//! than `tick()` — they only touch state behind `self.shared`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::chip::{RegisterSink, StereoMix, RESET_REGISTERS};
use crate::config::PlayerConfig;
use crate::device::filesystem::{Directory, FileSystem, FileType};
use crate::device::ByteSource;
use crate::error::Result;
use crate::heatshrink::{is_heatshrink_stream, HeatShrinkDecoder};
use crate::queue::{FrameQueue, Slot, SlotKind};
use crate::ymm::YmFrameDecoder;

/// Suggested idle interval while nothing is queued or playback is paused.
const IDLE_WAIT_US: u32 = 100_000;
/// Suggested interval once frames are being pushed (or the queue is full).
const BUSY_WAIT_US: u32 = 10_000;

/// Coarse playback status, reported for UI purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No file or directory is open.
    Idle,
    /// A file is open and frames are being produced.
    Playing,
    /// A file is open but `pause()` has been called.
    Paused,
}

/// Cross-thread control surface: everything `play`/`pause`/`skip`/`stop`
/// touch, read and drained by `tick()`.
#[derive(Default)]
struct Shared {
    next_file: Option<String>,
    next_dir: Option<String>,
    repeat_file: bool,
    repeat_dir: bool,
    paused: bool,
    skip_requested: bool,
    stop_requested: bool,
    stop_after_song: bool,
}

/// Drives decode-side playback: opens `.ymm` files (optionally HeatShrink
/// wrapped) from a [`FileSystem`], walks directories of them, and feeds
/// decoded frames into a [`FrameQueue`] for a realtime audio callback to
/// drain via [`PlayerScheduler::service_audio_callback`].
pub struct PlayerScheduler {
    fs: Box<dyn FileSystem>,
    queue: Arc<FrameQueue>,
    shared: Arc<Mutex<Shared>>,
    config: PlayerConfig,

    decoder: Option<YmFrameDecoder>,
    frames_played: u32,
    is_live: bool,

    dir: Option<Box<dyn Directory>>,
    dir_path: Option<String>,

    ay_clock: u32,
    frame_rate: i8,
    cc_per_frame: u32,
    cc_next: u32,
    stereo_mix: StereoMix,
}

impl std::fmt::Debug for PlayerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerScheduler")
            .field("config", &self.config)
            .field("frames_played", &self.frames_played)
            .field("is_live", &self.is_live)
            .field("dir_path", &self.dir_path)
            .field("cc_per_frame", &self.cc_per_frame)
            .field("cc_next", &self.cc_next)
            .field("stereo_mix", &self.stereo_mix)
            .finish()
    }
}

fn cc_per_frame(ay_clock: u32, frame_rate: i8) -> u32 {
    let frame_rate = frame_rate as u32;
    (ay_clock + frame_rate / 2) / frame_rate
}

fn open_ymm(fs: &dyn FileSystem, path: &str) -> Result<YmFrameDecoder> {
    let mut source: Box<dyn ByteSource> = fs.open(path)?;
    if is_heatshrink_stream(&mut *source)? {
        source = Box::new(HeatShrinkDecoder::from_header(source)?);
    }
    YmFrameDecoder::open(source)
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

impl PlayerScheduler {
    /// Builds a scheduler over `fs`, with no file or directory queued yet.
    pub fn new(fs: Box<dyn FileSystem>, config: PlayerConfig) -> Result<Self> {
        let queue = Arc::new(FrameQueue::new(config.queue_capacity)?);
        let shared = Shared {
            repeat_file: config.repeat_file,
            repeat_dir: config.repeat_directory,
            ..Shared::default()
        };
        Ok(Self {
            fs,
            queue,
            shared: Arc::new(Mutex::new(shared)),
            config,
            decoder: None,
            frames_played: 0,
            is_live: false,
            dir: None,
            dir_path: None,
            ay_clock: 0,
            frame_rate: 50,
            cc_per_frame: 1,
            cc_next: 0,
            stereo_mix: StereoMix::Mono,
        })
    }

    /// A cloneable handle to the frame queue, for wiring into an audio
    /// backend that lives on another thread.
    pub fn queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    /// Coarse playback status derived from whether a decoder is open and
    /// whether playback is paused.
    pub fn state(&self) -> PlaybackState {
        if self.decoder.is_none() {
            PlaybackState::Idle
        } else if self.shared.lock().paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    /// Queues `path` to start playing as soon as the current file (if any)
    /// finishes or is skipped.
    pub fn play(&self, path: &str, repeat_file: bool) {
        let mut shared = self.shared.lock();
        shared.next_file = Some(path.to_string());
        shared.next_dir = None;
        shared.repeat_file = repeat_file;
        shared.paused = false;
        shared.stop_requested = false;
    }

    /// Queues `path` as a directory to iterate for `*.ymm` files.
    pub fn play_directory(&self, path: &str, repeat_dir: bool) {
        let mut shared = self.shared.lock();
        shared.next_dir = Some(path.to_string());
        shared.next_file = None;
        shared.repeat_dir = repeat_dir;
        shared.paused = false;
        shared.stop_requested = false;
    }

    /// Suspends frame production; the currently open file stays open.
    pub fn pause(&self) {
        self.shared.lock().paused = true;
    }

    /// Resumes frame production after [`PlayerScheduler::pause`].
    pub fn resume(&self) {
        self.shared.lock().paused = false;
    }

    /// Abandons the current file immediately; `tick()` will advance to the
    /// next queued file or directory entry.
    pub fn skip(&self) {
        self.shared.lock().skip_requested = true;
    }

    /// Stops playback and clears any queued directory/file.
    pub fn stop(&self) {
        let mut shared = self.shared.lock();
        shared.stop_requested = true;
        shared.next_file = None;
        shared.next_dir = None;
    }

    /// Lets the current file play to completion, then stops instead of
    /// advancing to the next directory entry.
    pub fn stop_after_song(&self) {
        self.shared.lock().stop_after_song = true;
    }

    /// Sets output volume, clamped to `0.0..=1.0`.
    pub fn set_volume(&mut self, volume: f32) {
        self.config.volume = volume.clamp(0.0, 1.0);
    }

    /// Sets the audio device sample rate reported to the sound-chip
    /// emulator on the next reset.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.config.sample_rate = sample_rate;
    }

    /// Advances the state machine by one step. Returns a suggested number
    /// of microseconds to wait before the next call.
    pub fn tick(&mut self) -> u32 {
        if self.queue.free() == 0 {
            return BUSY_WAIT_US;
        }

        {
            let stop_requested = self.shared.lock().stop_requested;
            if stop_requested {
                self.decoder = None;
                self.dir = None;
                self.shared.lock().stop_requested = false;
            }
        }

        let skip_requested = {
            let mut shared = self.shared.lock();
            std::mem::take(&mut shared.skip_requested)
        };
        if skip_requested {
            self.decoder = None;
        }

        if let Some(mut decoder) = self.decoder.take() {
            if self.shared.lock().paused {
                self.decoder = Some(decoder);
                return IDLE_WAIT_US;
            }
            match decoder.read_frame() {
                Ok(registers) => {
                    self.queue.push(Slot {
                        registers,
                        what: SlotKind::Frame,
                    });
                    if !self.is_live {
                        self.is_live = true;
                    }
                    self.frames_played += 1;
                    let mut keep_playing = true;
                    if self.frames_played >= decoder.header().num_frames {
                        let still_uncontended = {
                            let shared = self.shared.lock();
                            shared.next_file.is_none() && shared.next_dir.is_none()
                        };
                        if self.shared.lock().repeat_file
                            && still_uncontended
                            && decoder.restart_at_loop().is_ok()
                        {
                            self.frames_played = decoder.header().loop_frame;
                        } else {
                            keep_playing = false;
                        }
                    }
                    if keep_playing {
                        self.decoder = Some(decoder);
                    }
                }
                Err(e) => {
                    eprintln!("ymm: decode error, stopping current file: {e}");
                }
            }
            return BUSY_WAIT_US;
        }

        let pending_file = self.shared.lock().next_file.take();
        if let Some(path) = pending_file {
            match open_ymm(&*self.fs, &path) {
                Ok(decoder) => {
                    self.ay_clock = decoder.header().ay_clock;
                    self.frame_rate = decoder.header().frame_rate;
                    self.cc_per_frame = cc_per_frame(self.ay_clock, self.frame_rate);
                    self.cc_next = 0;
                    self.frames_played = 0;
                    self.decoder = Some(decoder);
                    self.queue.push(Slot {
                        registers: RESET_REGISTERS,
                        what: SlotKind::Reset,
                    });
                }
                Err(e) => {
                    eprintln!("ymm: failed to open {path}: {e}");
                }
            }
            return BUSY_WAIT_US;
        }

        if let Some(mut dir) = self.dir.take() {
            match dir.next(Some("*.ymm")) {
                Ok(Some(entry)) if entry.file_type == FileType::File => {
                    let path = join_path(self.dir_path.as_deref().unwrap_or(""), &entry.name);
                    self.shared.lock().next_file = Some(path);
                    self.dir = Some(dir);
                }
                Ok(Some(_)) => {
                    // Skip subdirectories; try the next entry on the next tick.
                    self.dir = Some(dir);
                }
                Ok(None) => {
                    let (repeat_dir, contended) = {
                        let shared = self.shared.lock();
                        (shared.repeat_dir, shared.next_dir.is_some())
                    };
                    let stop_after_song = std::mem::take(&mut self.shared.lock().stop_after_song);
                    if !stop_after_song && repeat_dir && !contended && dir.rewind().is_ok() {
                        self.dir = Some(dir);
                    }
                }
                Err(e) => {
                    eprintln!("ymm: directory read error: {e}");
                }
            }
            return BUSY_WAIT_US;
        }

        let pending_dir = self.shared.lock().next_dir.take();
        if let Some(path) = pending_dir {
            match self.fs.open_dir(&path) {
                Ok(mut dir) => {
                    if dir.rewind().is_err() {
                        eprintln!("ymm: failed to rewind directory {path}");
                    } else {
                        self.dir = Some(dir);
                        self.dir_path = Some(path);
                    }
                }
                Err(e) => {
                    eprintln!("ymm: failed to open directory {path}: {e}");
                }
            }
            return BUSY_WAIT_US;
        }

        IDLE_WAIT_US
    }

    /// Drains at most one slot from the frame queue for the audio callback,
    /// writing register values into `sink` at `self.cc_next`, provided that
    /// cycle count falls within the buffer currently being rendered
    /// (`cc_buffer_end`). A reset slot reconfigures `sink`'s clock and
    /// stereo mix first. Returns `true` if a slot was consumed.
    ///
    /// If the queue is empty and no session is open, clears `is_live`: the
    /// audio side has caught up and nothing more is coming until `tick()`
    /// opens a new file.
    pub fn service_audio_callback(&mut self, sink: &mut dyn RegisterSink, cc_buffer_end: u32) -> bool {
        let Some(slot) = self.queue.peek() else {
            if self.decoder.is_none() {
                self.is_live = false;
            }
            return false;
        };
        if slot.what == SlotKind::Reset {
            sink.reconfigure(self.ay_clock, self.stereo_mix);
        }
        if self.cc_next >= cc_buffer_end {
            return false;
        }
        sink.write_register(self.cc_next, 0, slot.registers[0]);
        let last_register = if slot.registers[13] == 0x0f { 12 } else { 13 };
        for addr in 1..=last_register {
            sink.write_register(self.cc_next, addr as u8, slot.registers[addr]);
        }
        self.cc_next = self.cc_next.wrapping_add(self.cc_per_frame);
        self.queue.advance();
        true
    }

    /// Sets the stereo mix applied on the next reset frame.
    pub fn set_stereo_mix(&mut self, mix: StereoMix) {
        self.stereo_mix = mix;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::file::MemorySource;
    use crate::device::filesystem::FileMeta;
    use std::collections::HashMap;
    use std::io::Write;

    const MAGIC: [u8; 4] = *b"ymm!";

    fn bits_for_number(n: u32) -> Vec<bool> {
        let width = 32 - n.leading_zeros();
        let mut out = vec![false; (width - 1) as usize];
        out.push(true);
        for i in (0..width - 1).rev() {
            out.push((n >> i) & 1 != 0);
        }
        out
    }

    fn rle_code(value: u8, aybits: u8, count: u32) -> Vec<bool> {
        let mut out = vec![false];
        for i in (0..aybits).rev() {
            out.push((value >> i) & 1 != 0);
        }
        out.extend(bits_for_number(count));
        out
    }

    fn build_ymm(num_frames: u32, loop_frame: u32, frame_rate: u8) -> Vec<u8> {
        let buffer_bits: u8 = 8;
        let mut rbusz: u32 = 0;
        for r in 0..16u32 {
            rbusz |= 2 << (2 * r);
        }

        let mut bits = Vec::new();
        for _ in 0..num_frames {
            for r in 0..16u8 {
                bits.extend(rle_code(0, crate::chip::AY_REGISTER_BITS[r as usize], 1));
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.push(2); // variant
        out.push(buffer_bits);
        out.push(frame_rate);
        out.push(16); // registers per frame
        out.extend_from_slice(&num_frames.to_le_bytes());
        out.extend_from_slice(&loop_frame.to_le_bytes());
        out.extend_from_slice(&2_000_000u32.to_le_bytes());
        out.write_all(b"t\0a\0c\0").unwrap();
        out.extend_from_slice(&rbusz.to_le_bytes());

        let mut padded = bits;
        while padded.len() % 8 != 0 {
            padded.push(false);
        }
        for chunk in padded.chunks(8) {
            let mut byte = 0u8;
            for (i, &b) in chunk.iter().enumerate() {
                if b {
                    byte |= 1 << (7 - i);
                }
            }
            out.push(byte);
        }
        out
    }

    struct FakeFs {
        files: HashMap<String, Vec<u8>>,
    }

    impl FileSystem for FakeFs {
        fn open(&self, path: &str) -> Result<Box<dyn ByteSource>> {
            let data = self
                .files
                .get(path)
                .cloned()
                .ok_or(crate::error::DeviceError::InvalidArgument(format!(
                    "no such file: {path}"
                )))?;
            Ok(Box::new(MemorySource::new(data)))
        }

        fn stat(&self, path: &str) -> Result<FileMeta> {
            let data = self
                .files
                .get(path)
                .ok_or(crate::error::DeviceError::InvalidArgument(format!(
                    "no such file: {path}"
                )))?;
            Ok(FileMeta {
                name: path.to_string(),
                file_type: FileType::File,
                size: data.len() as u32,
            })
        }

        fn open_dir(&self, _path: &str) -> Result<Box<dyn Directory>> {
            Err(crate::error::DeviceError::InvalidArgument(
                "no directories in this fake".into(),
            ))
        }
    }

    struct RecordingSink {
        writes: Vec<(u32, u8, u8)>,
        reconfigures: Vec<(u32, StereoMix)>,
    }

    impl RegisterSink for RecordingSink {
        fn write_register(&mut self, cc: u32, addr: u8, value: u8) {
            self.writes.push((cc, addr, value));
        }

        fn reconfigure(&mut self, clock_hz: u32, stereo_mix: StereoMix) {
            self.reconfigures.push((clock_hz, stereo_mix));
        }
    }

    fn scheduler_with_file(path: &str, data: Vec<u8>) -> PlayerScheduler {
        let mut files = HashMap::new();
        files.insert(path.to_string(), data);
        let fs = Box::new(FakeFs { files });
        PlayerScheduler::new(fs, PlayerConfig::default()).unwrap()
    }

    #[test]
    fn play_opens_file_and_pushes_reset_then_frames() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(2, 0, 50));
        scheduler.play("song.ymm", false);

        scheduler.tick(); // opens the file, pushes a reset slot
        assert_eq!(scheduler.state(), PlaybackState::Playing);
        assert_eq!(scheduler.queue.pop().unwrap().what, SlotKind::Reset);

        scheduler.tick(); // decodes frame 1
        assert_eq!(scheduler.queue.pop().unwrap().what, SlotKind::Frame);
    }

    #[test]
    fn is_live_set_on_first_frame_and_cleared_once_audio_side_drains_a_closed_session() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(1, 0, 50));
        scheduler.play("song.ymm", false);
        assert!(!scheduler.is_live);

        scheduler.tick(); // opens the file, pushes a reset slot
        assert!(!scheduler.is_live);

        scheduler.tick(); // decodes the only frame, reaches num_frames, closes
        assert!(scheduler.is_live);
        assert_eq!(scheduler.state(), PlaybackState::Idle);

        let mut sink = RecordingSink {
            writes: Vec::new(),
            reconfigures: Vec::new(),
        };
        scheduler.service_audio_callback(&mut sink, u32::MAX); // drains the reset slot
        assert!(scheduler.is_live);
        scheduler.service_audio_callback(&mut sink, u32::MAX); // drains the frame slot
        assert!(scheduler.is_live);
        let consumed = scheduler.service_audio_callback(&mut sink, u32::MAX); // queue empty now
        assert!(!consumed);
        assert!(!scheduler.is_live);
    }

    #[test]
    fn missing_file_leaves_scheduler_idle() {
        let scheduler = scheduler_with_file("song.ymm", build_ymm(1, 0, 50));
        scheduler.play("missing.ymm", false);
        let mut scheduler = scheduler;
        scheduler.tick();
        assert_eq!(scheduler.state(), PlaybackState::Idle);
    }

    #[test]
    fn pause_stops_frame_production() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(3, 0, 50));
        scheduler.play("song.ymm", false);
        scheduler.tick();
        scheduler.queue.pop();
        scheduler.pause();
        scheduler.tick();
        assert!(scheduler.queue.pop().is_none());
        assert_eq!(scheduler.state(), PlaybackState::Paused);
    }

    #[test]
    fn full_queue_defers_decode() {
        let mut config = PlayerConfig::default();
        config.queue_capacity = 1;
        let mut files = HashMap::new();
        files.insert("song.ymm".to_string(), build_ymm(2, 0, 50));
        let fs = Box::new(FakeFs { files });
        let mut scheduler = PlayerScheduler::new(fs, config).unwrap();
        scheduler.play("song.ymm", false);

        scheduler.tick(); // fills the single slot with the reset marker
        assert_eq!(scheduler.queue.free(), 0);
        scheduler.tick(); // queue full, no decode progress
        assert_eq!(scheduler.frames_played, 0);
    }

    #[test]
    fn loop_restarts_at_loop_frame_when_repeat_enabled() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(2, 1, 50));
        scheduler.play("song.ymm", true);

        scheduler.tick(); // open + reset
        scheduler.queue.pop();
        scheduler.tick(); // frame 0
        scheduler.queue.pop();
        scheduler.tick(); // frame 1 reaches num_frames, loops back to loop_frame
        scheduler.queue.pop();
        assert_eq!(scheduler.state(), PlaybackState::Playing);
        assert_eq!(scheduler.frames_played, 1);
    }

    #[test]
    fn service_audio_callback_writes_register_zero_first() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(1, 0, 50));
        scheduler.play("song.ymm", false);
        scheduler.tick();

        let mut sink = RecordingSink {
            writes: Vec::new(),
            reconfigures: Vec::new(),
        };
        let consumed = scheduler.service_audio_callback(&mut sink, u32::MAX);
        assert!(consumed);
        assert_eq!(sink.reconfigures.len(), 1);
        assert_eq!(sink.writes[0], (0, 0, 0));
    }

    #[test]
    fn service_audio_callback_waits_for_buffer_to_catch_up() {
        let mut scheduler = scheduler_with_file("song.ymm", build_ymm(1, 0, 50));
        scheduler.play("song.ymm", false);
        scheduler.tick();

        let mut sink = RecordingSink {
            writes: Vec::new(),
            reconfigures: Vec::new(),
        };
        let consumed = scheduler.service_audio_callback(&mut sink, 0);
        assert!(!consumed);
        assert!(sink.writes.is_empty());
    }

    #[test]
    fn cc_per_frame_rounds_to_nearest() {
        assert_eq!(cc_per_frame(2_000_000, 50), 40_000);
        assert_eq!(cc_per_frame(1_000_000, 3), 333_333);
    }
}
