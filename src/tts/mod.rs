//! Synthesis bridge: an object-lifetime façade over a text-to-speech engine.
//!
//! A [`Synthesizer`] owns one [`SpeechEngine`] until [`Synthesizer::destroy`]
//! drops it.  Synthesis takes the read side of an `RwLock`; `destroy` takes
//! the write side, so it waits for in-flight synthesis and every later call
//! fails with [`BridgeError::Destroyed`].  Sample rate and speakers are read
//! once at construction, so the accessors never touch the lock.
//!
//! Long input is split into chunks of at most `max_sentence_length`
//! characters ([`chunk::chunk_text`]); each chunk is one engine call and one
//! progress step.

pub mod audio;
pub mod chunk;
pub mod frontend;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "espeak")]
pub mod phonemize;
pub mod symbols;
pub mod voices;

use std::{
    cell::RefCell,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

pub use audio::AudioBuffer;

// ─────────────────────────────────────────────────────────────────────────────
// Model type
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of supported TTS model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Kitten,
    Vits,
    Kokoro,
    Matcha,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [Self::Kitten, Self::Vits, Self::Kokoro, Self::Matcha];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kitten => "kitten",
            Self::Vits => "vits",
            Self::Kokoro => "kokoro",
            Self::Matcha => "matcha",
        }
    }

    /// Output rate used when the model directory does not declare one.
    pub fn default_sample_rate(self) -> u32 {
        match self {
            Self::Kitten | Self::Kokoro => 24_000,
            Self::Vits | Self::Matcha => 22_050,
        }
    }

    /// Style-vector models take a per-speaker embedding from `voices.npz`.
    pub fn uses_voice_bank(self) -> bool {
        matches!(self, Self::Kitten | Self::Kokoro)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BridgeError::UnsupportedModelType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Everything [`Synthesizer::initialize`] needs to open a model.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    /// Model directory.
    pub model_path: PathBuf,
    pub model_type: ModelType,
    /// Intra-op threads for inference.
    pub num_threads: usize,
    /// Chunk bound in characters.
    pub max_sentence_length: usize,
}

impl SynthesisConfig {
    /// Build a config from boundary values (`NSString` / `NSInteger`).
    pub fn parse(
        model_path: &str,
        model_type: &str,
        num_threads: i64,
        max_sentence_length: i64,
    ) -> Result<Self> {
        if model_path.is_empty() {
            return Err(BridgeError::invalid("empty model path"));
        }
        let model_type = model_type.parse()?;
        let num_threads = usize::try_from(num_threads)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| BridgeError::invalid(format!("num_threads must be >= 1, got {num_threads}")))?;
        let max_sentence_length = usize::try_from(max_sentence_length)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| {
                BridgeError::invalid(format!("max_sentence_length must be >= 1, got {max_sentence_length}"))
            })?;
        Ok(Self { model_path: PathBuf::from(model_path), model_type, num_threads, max_sentence_length })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine seam
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded speech model.  Speaker ids passed in are already validated.
pub trait SpeechEngine: Send + Sync {
    /// Fixed for the lifetime of the engine.
    fn sample_rate(&self) -> u32;
    fn num_speakers(&self) -> usize;
    /// `None` when the model has no named speakers.
    fn speaker_name(&self, speaker: usize) -> Option<String>;
    /// Synthesize one chunk to mono f32 samples in `[-1, 1]`.
    fn synthesize_chunk(&self, text: &str, speaker: usize, speed: f32) -> anyhow::Result<Vec<f32>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

type EngineSlot = Option<Box<dyn SpeechEngine>>;

thread_local! {
    /// Synthesizers whose progress callback is running on this thread.
    static REPORTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a synthesizer as reporting progress on this thread until dropped.
struct Reporting(usize);

impl Reporting {
    fn enter(id: usize) -> Self {
        REPORTING.with(|r| r.borrow_mut().push(id));
        Self(id)
    }

    fn active(id: usize) -> bool {
        REPORTING.with(|r| r.borrow().contains(&id))
    }
}

impl Drop for Reporting {
    fn drop(&mut self) {
        REPORTING.with(|r| {
            let mut r = r.borrow_mut();
            if let Some(pos) = r.iter().rposition(|&id| id == self.0) {
                r.remove(pos);
            }
        });
    }
}

pub struct Synthesizer {
    config: SynthesisConfig,
    sample_rate: u32,
    speaker_names: Vec<Option<String>>,
    engine: RwLock<EngineSlot>,
    destroyed: AtomicBool,
}

impl Synthesizer {
    /// Open the model described by `config` with the ONNX Runtime engine.
    #[cfg(feature = "onnx")]
    pub fn initialize(config: SynthesisConfig) -> Result<Self> {
        let engine = onnx::OnnxEngine::load(&config)
            .map_err(|e| BridgeError::load(config.model_path.display().to_string(), e))?;
        Ok(Self::with_engine(config, Box::new(engine)))
    }

    /// Without the `onnx` feature no engine can be loaded from disk.
    #[cfg(not(feature = "onnx"))]
    pub fn initialize(config: SynthesisConfig) -> Result<Self> {
        Err(BridgeError::load(
            config.model_path.display().to_string(),
            anyhow::anyhow!("built without the `onnx` feature; no {} engine available", config.model_type),
        ))
    }

    /// Wrap an already-loaded engine.
    pub fn with_engine(config: SynthesisConfig, engine: Box<dyn SpeechEngine>) -> Self {
        info!(
            model = %config.model_path.display(),
            model_type = %config.model_type,
            speakers = engine.num_speakers(),
            sample_rate = engine.sample_rate(),
            "synthesizer ready"
        );
        let speaker_names = (0..engine.num_speakers()).map(|i| engine.speaker_name(i)).collect();
        Self {
            config,
            sample_rate: engine.sample_rate(),
            speaker_names,
            engine: RwLock::new(Some(engine)),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// Run `f` against the live engine, or fail with [`BridgeError::Destroyed`].
    fn using_engine<R>(&self, f: impl FnOnce(&dyn SpeechEngine) -> Result<R>) -> Result<R> {
        let slot = self.engine.read().unwrap_or_else(|p| p.into_inner());
        let engine = slot.as_deref().ok_or(BridgeError::Destroyed)?;
        f(engine)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        Ok(())
    }

    pub fn num_speakers(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.speaker_names.len())
    }

    pub fn sample_rate(&self) -> Result<u32> {
        self.ensure_live()?;
        Ok(self.sample_rate)
    }

    /// `0 <= id < num_speakers()`; `false` once destroyed.
    pub fn is_valid_speaker(&self, id: i64) -> bool {
        self.num_speakers().is_ok_and(|n| speaker_index(id, n).is_some())
    }

    pub fn speaker_name(&self, id: i64) -> Option<String> {
        self.ensure_live().ok()?;
        let i = speaker_index(id, self.speaker_names.len())?;
        self.speaker_names[i].clone()
    }

    pub fn synthesize(&self, text: &str, speaker_id: i64, speed: f32) -> Result<AudioBuffer> {
        self.synthesize_with_progress(text, speaker_id, speed, |_| {})
    }

    /// Synthesize `text`, reporting the fraction of chunks completed.
    ///
    /// `progress` runs on this thread after every chunk with non-decreasing
    /// values in `(0, 1]`, the last one `1.0`.  It is never called after this
    /// function returns.
    ///
    /// `progress` may query this synthesizer's accessors.  Synthesizing with
    /// it again from inside `progress` fails with
    /// [`BridgeError::InvalidArgument`], and [`destroy`](Self::destroy)
    /// from inside `progress` is refused.
    pub fn synthesize_with_progress(
        &self,
        text: &str,
        speaker_id: i64,
        speed: f32,
        mut progress: impl FnMut(f32),
    ) -> Result<AudioBuffer> {
        if Reporting::active(self.id()) {
            return Err(BridgeError::invalid("synthesize called from its own progress callback"));
        }
        self.using_engine(|engine| {
            let speakers = engine.num_speakers();
            let speaker = speaker_index(speaker_id, speakers).ok_or_else(|| {
                BridgeError::invalid(format!("speaker {speaker_id} outside [0, {speakers})"))
            })?;
            if !speed.is_finite() || speed <= 0.0 {
                return Err(BridgeError::invalid(format!("speed must be positive, got {speed}")));
            }

            let chunks = chunk::chunk_text(text, self.config.max_sentence_length);
            if chunks.is_empty() {
                return Err(BridgeError::invalid("nothing to synthesize"));
            }

            let total = chunks.len();
            let mut samples = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                debug!(chunk = i + 1, total, chars = chunk.chars().count(), "synthesizing chunk");
                samples.extend(engine.synthesize_chunk(chunk, speaker, speed)?);
                let _reporting = Reporting::enter(self.id());
                progress((i + 1) as f32 / total as f32);
            }
            Ok(AudioBuffer::new(samples, engine.sample_rate()))
        })
    }

    /// Drop the engine.  Returns `true` if this call released it.
    ///
    /// Waits for in-flight synthesis to finish.  Called from this
    /// synthesizer's own progress callback it would wait on itself, so it
    /// returns `false` and leaves the engine in place.
    pub fn destroy(&self) -> bool {
        if Reporting::active(self.id()) {
            warn!("destroy from inside a progress callback refused");
            return false;
        }
        let mut slot = self.engine.write().unwrap_or_else(|p| p.into_inner());
        match slot.take() {
            Some(engine) => {
                self.destroyed.store(true, Ordering::Release);
                drop(engine);
                info!(model = %self.config.model_path.display(), "synthesizer destroyed");
                true
            }
            None => {
                warn!("destroy on an already destroyed synthesizer ignored");
                false
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

fn speaker_index(id: i64, speakers: usize) -> Option<usize> {
    usize::try_from(id).ok().filter(|&i| i < speakers)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, mpsc, Arc, Mutex};
    use std::{thread, time::Duration};

    /// Emits `speed`-scaled silence: 10 samples per character.
    struct Silence {
        speakers: usize,
        calls: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
    }

    impl Drop for Silence {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SpeechEngine for Silence {
        fn sample_rate(&self) -> u32 {
            16_000
        }
        fn num_speakers(&self) -> usize {
            self.speakers
        }
        fn speaker_name(&self, speaker: usize) -> Option<String> {
            (self.speakers > 1).then(|| format!("voice-{speaker}"))
        }
        fn synthesize_chunk(&self, text: &str, _speaker: usize, speed: f32) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("boom") {
                anyhow::bail!("engine exploded");
            }
            let n = (text.chars().count() as f32 * 10.0 / speed) as usize;
            Ok(vec![0.0; n])
        }
    }

    struct Fixture {
        synth: Synthesizer,
        calls: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
    }

    fn fixture(speakers: usize, max_len: i64) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(1));
        let config = SynthesisConfig::parse("/models/test", "vits", 2, max_len).unwrap();
        let engine = Silence { speakers, calls: Arc::clone(&calls), live: Arc::clone(&live) };
        Fixture { synth: Synthesizer::with_engine(config, Box::new(engine)), calls, live }
    }

    #[test]
    fn test_model_type_parse() {
        assert_eq!("kitten".parse::<ModelType>().unwrap(), ModelType::Kitten);
        assert_eq!("VITS".parse::<ModelType>().unwrap(), ModelType::Vits);
        assert_eq!(" Kokoro ".parse::<ModelType>().unwrap(), ModelType::Kokoro);
        assert_eq!("matcha".parse::<ModelType>().unwrap(), ModelType::Matcha);
        assert!(matches!(
            "unknown-type".parse::<ModelType>(),
            Err(BridgeError::UnsupportedModelType(t)) if t == "unknown-type"
        ));
        for t in ModelType::ALL {
            assert_eq!(t.to_string().parse::<ModelType>().unwrap(), t);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(SynthesisConfig::parse("/m", "kitten", 4, 100).is_ok());
        assert!(matches!(
            SynthesisConfig::parse("/m", "unknown-type", 4, 100),
            Err(BridgeError::UnsupportedModelType(_))
        ));
        assert!(SynthesisConfig::parse("", "kitten", 4, 100).is_err());
        assert!(SynthesisConfig::parse("/m", "kitten", 0, 100).is_err());
        assert!(SynthesisConfig::parse("/m", "kitten", 4, -1).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_initialize_without_engine_fails() {
        let config = SynthesisConfig::parse("/m", "kitten", 1, 100).unwrap();
        assert!(matches!(Synthesizer::initialize(config), Err(BridgeError::Load { .. })));
    }

    #[test]
    fn test_is_valid_speaker_matches_range() {
        let f = fixture(3, 100);
        for id in -3..6 {
            assert_eq!(f.synth.is_valid_speaker(id), (0..3).contains(&id), "id {id}");
        }
        assert!(!f.synth.is_valid_speaker(i64::MAX));
        assert!(!f.synth.is_valid_speaker(i64::MIN));
    }

    #[test]
    fn test_speaker_names() {
        let f = fixture(2, 100);
        assert_eq!(f.synth.speaker_name(1).as_deref(), Some("voice-1"));
        assert_eq!(f.synth.speaker_name(2), None);
        assert_eq!(f.synth.speaker_name(-1), None);
        let single = fixture(1, 100);
        assert_eq!(single.synth.speaker_name(0), None);
    }

    #[test]
    fn test_synthesize_basic() {
        let f = fixture(1, 100);
        let audio = f.synth.synthesize("Hello world.", 0, 1.0).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples.len(), "Hello world.".len() * 10);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_speed_scales_output() {
        let f = fixture(1, 100);
        let normal = f.synth.synthesize("Hello world.", 0, 1.0).unwrap();
        let fast = f.synth.synthesize("Hello world.", 0, 2.0).unwrap();
        assert_eq!(fast.samples.len() * 2, normal.samples.len());
    }

    #[test]
    fn test_invalid_arguments_fail_without_engine_call() {
        let f = fixture(2, 100);
        assert!(f.synth.synthesize("Hi.", 2, 1.0).is_err());
        assert!(f.synth.synthesize("Hi.", -1, 1.0).is_err());
        assert!(f.synth.synthesize("Hi.", 0, 0.0).is_err());
        assert!(f.synth.synthesize("Hi.", 0, f32::NAN).is_err());
        assert!(f.synth.synthesize("   ", 0, 1.0).is_err());
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let f = fixture(1, 12);
        let text = "One two three. Four five six seven eight. Nine! Ten eleven twelve thirteen?";
        let mut seen = Vec::new();
        let audio = f.synth.synthesize_with_progress(text, 0, 1.0, |p| seen.push(p)).unwrap();
        assert!(!audio.samples.is_empty());
        assert!(seen.len() > 1);
        assert_eq!(seen.len(), f.calls.load(Ordering::SeqCst));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }

    #[test]
    fn test_engine_error_stops_progress() {
        let f = fixture(1, 100);
        let mut seen = Vec::new();
        let result = f.synth.synthesize_with_progress("Fine. Then boom. Never.", 0, 1.0, |p| seen.push(p));
        assert!(matches!(result, Err(BridgeError::Engine(_))));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent_and_fails_later_calls() {
        let f = fixture(2, 100);
        assert!(f.synth.destroy());
        assert_eq!(f.live.load(Ordering::SeqCst), 0);
        assert!(!f.synth.destroy());
        assert!(f.synth.is_destroyed());
        assert!(matches!(f.synth.synthesize("Hi.", 0, 1.0), Err(BridgeError::Destroyed)));
        assert!(matches!(f.synth.num_speakers(), Err(BridgeError::Destroyed)));
        assert!(f.synth.sample_rate().is_err());
        assert!(!f.synth.is_valid_speaker(0));
        assert_eq!(f.synth.speaker_name(0), None);
    }

    /// Blocks inside `synthesize_chunk` until released.  Each chunk signals
    /// `entered` and then waits for one message on `release`.
    pub(crate) struct Gate {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Gate {
        /// The engine, its `entered` receiver and its `release` sender.
        pub(crate) fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let gate = Self { entered: Mutex::new(entered_tx), release: Mutex::new(release_rx) };
            (gate, entered_rx, release_tx)
        }
    }

    impl SpeechEngine for Gate {
        fn sample_rate(&self) -> u32 {
            8_000
        }
        fn num_speakers(&self) -> usize {
            1
        }
        fn speaker_name(&self, _speaker: usize) -> Option<String> {
            None
        }
        fn synthesize_chunk(&self, text: &str, _speaker: usize, _speed: f32) -> anyhow::Result<Vec<f32>> {
            self.entered.lock().unwrap().send(())?;
            self.release.lock().unwrap().recv()?;
            Ok(vec![0.25; text.len()])
        }
    }

    #[test]
    fn test_destroy_waits_for_in_flight_synthesis() {
        let (engine, entered_rx, release_tx) = Gate::new();
        let config = SynthesisConfig::parse("/models/gate", "vits", 1, 100).unwrap();
        let synth = Arc::new(Synthesizer::with_engine(config, Box::new(engine)));

        let speaking = {
            let synth = Arc::clone(&synth);
            thread::spawn(move || synth.synthesize("Hold on.", 0, 1.0))
        };
        entered_rx.recv().unwrap();

        let returned = Arc::new(AtomicBool::new(false));
        let destroying = {
            let (synth, returned) = (Arc::clone(&synth), Arc::clone(&returned));
            thread::spawn(move || {
                let released = synth.destroy();
                returned.store(true, Ordering::SeqCst);
                released
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!returned.load(Ordering::SeqCst), "destroy returned while a chunk was running");

        release_tx.send(()).unwrap();
        let audio = speaking.join().unwrap().unwrap();
        assert_eq!(audio.samples.len(), "Hold on.".len());
        assert!(destroying.join().unwrap());
        assert!(returned.load(Ordering::SeqCst));
        assert!(matches!(synth.synthesize("Again.", 0, 1.0), Err(BridgeError::Destroyed)));
    }

    #[test]
    fn test_progress_callback_may_query_accessors() {
        let f = fixture(2, 8);
        let mut seen = Vec::new();
        f.synth
            .synthesize_with_progress("One two. Three four.", 0, 1.0, |_| {
                seen.push((f.synth.num_speakers().unwrap(), f.synth.sample_rate().unwrap()));
                assert_eq!(f.synth.speaker_name(1).as_deref(), Some("voice-1"));
            })
            .unwrap();
        assert_eq!(seen.len(), f.calls.load(Ordering::SeqCst));
        assert!(seen.iter().all(|&s| s == (2, 16_000)), "{seen:?}");
    }

    #[test]
    fn test_reentry_from_progress_callback_is_refused() {
        let f = fixture(1, 8);
        let mut nested = Vec::new();
        let mut destroyed = Vec::new();
        let audio = f.synth.synthesize_with_progress("One two. Three four.", 0, 1.0, |_| {
            nested.push(f.synth.synthesize("Inner.", 0, 1.0).is_err());
            destroyed.push(f.synth.destroy());
        });
        assert!(audio.is_ok());
        assert!(nested.len() > 1);
        assert!(nested.iter().all(|&refused| refused));
        assert!(destroyed.iter().all(|&released| !released));
        assert_eq!(f.calls.load(Ordering::SeqCst), nested.len());
        assert!(!f.synth.is_destroyed());

        // Once the call has returned the synthesizer behaves normally again.
        assert!(f.synth.synthesize("Later.", 0, 1.0).is_ok());
        assert!(f.synth.destroy());
    }

    #[test]
    fn test_sample_rate_is_stable() {
        let f = fixture(1, 100);
        let first = f.synth.sample_rate().unwrap();
        f.synth.synthesize("Hello.", 0, 1.0).unwrap();
        assert_eq!(f.synth.sample_rate().unwrap(), first);
    }
}
