//! ONNX Runtime speech engine.
//!
//! Model directory layout:
//!
//! | File           | Needed by               | Notes                               |
//! |----------------|-------------------------|-------------------------------------|
//! | `model.onnx`   | all                     | name overridable in `config.json`   |
//! | `voices.npz`   | kitten, kokoro          | one style matrix per speaker        |
//! | `vocoder.onnx` | matcha                  | mel → waveform                      |
//! | `tokens.txt`   | optional                | falls back to the built-in IPA set  |
//! | `config.json`  | optional                | see [`TtsManifest`]                 |
//!
//! Graph inputs are positional:
//!
//! | Model          | Inputs                                                          |
//! |----------------|-----------------------------------------------------------------|
//! | kitten, kokoro | `ids [1,n] i64`, `style [1,d] f32`, `speed [1] f32`             |
//! | vits           | `x [1,n] i64`, `x_len [1] i64`, `noise [1]`, `length [1]`, `noise_w [1]`, `sid [1] i64` |
//! | matcha         | `x [1,n] i64`, `x_len [1] i64`, `noise [1]`, `length [1]` (+ `sid [1] i64` if multi-speaker) |
//!
//! kitten and kokoro chunks pass through [`TextFrontend`] first, so they are
//! phonemised (feature `espeak`) or must already be IPA.

use std::{path::Path, sync::Mutex};

use anyhow::{anyhow, ensure, Context, Result};
use ort::{session::Session, value::Tensor};
use tracing::{debug, info};

use super::{
    frontend::TextFrontend, symbols::SymbolTable, voices::VoiceBank, ModelType, SpeechEngine, SynthesisConfig,
};
use crate::config::TtsManifest;

/// Samples trimmed from the tail of every kitten waveform (silence artifact).
const KITTEN_TAIL_TRIM: usize = 5_000;

const DEFAULT_NOISE_SCALE: f32 = 0.667;
const DEFAULT_NOISE_SCALE_W: f32 = 0.8;
const DEFAULT_LENGTH_SCALE: f32 = 1.0;

fn open_session(path: &Path, num_threads: usize) -> Result<Session> {
    Session::builder()
        .context("Failed to create ORT session builder")?
        .with_intra_threads(num_threads)
        .map_err(|e| anyhow!("Cannot set {num_threads} intra-op threads: {e}"))?
        .commit_from_file(path)
        .with_context(|| format!("Cannot load ONNX model: {}", path.display()))
}

/// Speakers are either style vectors (kitten, kokoro) or integer ids.
enum Speakers {
    Voices(VoiceBank),
    Ids { count: usize, names: Vec<String> },
}

pub struct OnnxEngine {
    model_type: ModelType,
    session: Mutex<Session>,
    vocoder: Option<Mutex<Session>>,
    frontend: TextFrontend,
    symbols: SymbolTable,
    speakers: Speakers,
    sample_rate: u32,
    noise_scale: f32,
    noise_scale_w: f32,
    length_scale: f32,
}

impl OnnxEngine {
    pub fn load(config: &SynthesisConfig) -> Result<Self> {
        let dir = config.model_path.as_path();
        ensure!(dir.is_dir(), "model directory not found: {}", dir.display());
        let manifest = TtsManifest::for_model_dir(dir)?;

        let session = open_session(&dir.join(manifest.model_file()), config.num_threads)?;
        let vocoder = match config.model_type {
            ModelType::Matcha => Some(Mutex::new(open_session(
                &dir.join(manifest.vocoder_file()),
                config.num_threads,
            )?)),
            _ => None,
        };

        let speakers = if config.model_type.uses_voice_bank() {
            Speakers::Voices(VoiceBank::load(&dir.join("voices.npz"))?)
        } else {
            Speakers::Ids { count: manifest.declared_speakers(), names: manifest.speakers.clone() }
        };

        let engine = Self {
            model_type: config.model_type,
            session: Mutex::new(session),
            vocoder,
            frontend: TextFrontend::for_model(config.model_type),
            symbols: SymbolTable::for_model_dir(dir)?,
            speakers,
            sample_rate: manifest.sample_rate_for(config.model_type),
            noise_scale: manifest.noise_scale.unwrap_or(DEFAULT_NOISE_SCALE),
            noise_scale_w: manifest.noise_scale_w.unwrap_or(DEFAULT_NOISE_SCALE_W),
            length_scale: manifest.length_scale.unwrap_or(DEFAULT_LENGTH_SCALE),
        };
        info!(
            dir = %dir.display(),
            model_type = %config.model_type,
            threads = config.num_threads,
            symbols = engine.symbols.len(),
            "onnx engine loaded"
        );
        Ok(engine)
    }

    /// kitten / kokoro: `(ids, style, speed)` → waveform.
    fn run_styled(&self, ids: Vec<i64>, text_len: usize, speaker: usize, speed: f32) -> Result<Vec<f32>> {
        let Speakers::Voices(bank) = &self.speakers else {
            return Err(anyhow!("{} model has no voice bank", self.model_type));
        };
        let style = bank
            .style(speaker, text_len)
            .with_context(|| format!("No voice for speaker {speaker}"))?;

        let seq_len = ids.len();
        let t_ids = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .context("Failed to build input_ids tensor")?;
        let t_style = Tensor::<f32>::from_array(([1usize, style.len()], style.to_vec()))
            .context("Failed to build style tensor")?;
        let t_speed = Tensor::<f32>::from_array(([1usize], vec![speed]))
            .context("Failed to build speed tensor")?;

        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session
            .run(ort::inputs![t_ids, t_style, t_speed])
            .context("ONNX inference failed")?;
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;

        let mut audio = audio.to_vec();
        if self.model_type == ModelType::Kitten {
            audio.truncate(audio.len().saturating_sub(KITTEN_TAIL_TRIM));
        }
        Ok(audio)
    }

    /// vits: one graph, speaker as an id input.
    fn run_vits(&self, ids: Vec<i64>, speaker: usize, speed: f32) -> Result<Vec<f32>> {
        let seq_len = ids.len();
        let t_x = Tensor::<i64>::from_array(([1usize, seq_len], ids)).context("Failed to build x tensor")?;
        let t_len = Tensor::<i64>::from_array(([1usize], vec![seq_len as i64]))
            .context("Failed to build x_length tensor")?;
        let t_noise = Tensor::<f32>::from_array(([1usize], vec![self.noise_scale]))
            .context("Failed to build noise_scale tensor")?;
        let t_length = Tensor::<f32>::from_array(([1usize], vec![self.length_scale / speed]))
            .context("Failed to build length_scale tensor")?;
        let t_noise_w = Tensor::<f32>::from_array(([1usize], vec![self.noise_scale_w]))
            .context("Failed to build noise_scale_w tensor")?;
        let t_sid = Tensor::<i64>::from_array(([1usize], vec![speaker as i64]))
            .context("Failed to build sid tensor")?;

        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session
            .run(ort::inputs![t_x, t_len, t_noise, t_length, t_noise_w, t_sid])
            .context("ONNX inference failed")?;
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;
        Ok(audio.to_vec())
    }

    /// matcha: acoustic model → mel, then vocoder → waveform.
    fn run_matcha(&self, ids: Vec<i64>, speaker: usize, speed: f32) -> Result<Vec<f32>> {
        let vocoder = self.vocoder.as_ref().context("matcha model loaded without a vocoder")?;
        let seq_len = ids.len();
        let t_x = Tensor::<i64>::from_array(([1usize, seq_len], ids)).context("Failed to build x tensor")?;
        let t_len = Tensor::<i64>::from_array(([1usize], vec![seq_len as i64]))
            .context("Failed to build x_length tensor")?;
        let t_noise = Tensor::<f32>::from_array(([1usize], vec![self.noise_scale]))
            .context("Failed to build noise_scale tensor")?;
        let t_length = Tensor::<f32>::from_array(([1usize], vec![self.length_scale / speed]))
            .context("Failed to build length_scale tensor")?;

        let (mel_shape, mel) = {
            let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            let run = if self.num_speakers() > 1 {
                let t_sid = Tensor::<i64>::from_array(([1usize], vec![speaker as i64]))
                    .context("Failed to build sid tensor")?;
                session.run(ort::inputs![t_x, t_len, t_noise, t_length, t_sid])
            } else {
                session.run(ort::inputs![t_x, t_len, t_noise, t_length])
            };
            let outputs = run.context("Acoustic model inference failed")?;
            let (shape, mel) = outputs[0]
                .try_extract_tensor::<f32>()
                .context("Failed to extract mel tensor")?;
            let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            (shape, mel.to_vec())
        };
        debug!(?mel_shape, "matcha mel");

        let t_mel = Tensor::<f32>::from_array((mel_shape, mel)).context("Failed to build mel tensor")?;
        let mut vocoder = vocoder.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = vocoder.run(ort::inputs![t_mel]).context("Vocoder inference failed")?;
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;
        Ok(audio.to_vec())
    }
}

impl SpeechEngine for OnnxEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn num_speakers(&self) -> usize {
        match &self.speakers {
            Speakers::Voices(bank) => bank.len(),
            Speakers::Ids { count, .. } => *count,
        }
    }

    fn speaker_name(&self, speaker: usize) -> Option<String> {
        match &self.speakers {
            Speakers::Voices(bank) => bank.name(speaker).map(str::to_string),
            Speakers::Ids { names, .. } => names.get(speaker).cloned(),
        }
    }

    fn synthesize_chunk(&self, text: &str, speaker: usize, speed: f32) -> Result<Vec<f32>> {
        let text_len = text.chars().count();
        let input = self.frontend.prepare(text)?;
        let ids = self.symbols.encode(&input);
        debug!(chars = text_len, tokens = ids.len(), speaker, speed, "onnx chunk");
        match self.model_type {
            ModelType::Kitten | ModelType::Kokoro => self.run_styled(ids, text_len, speaker, speed),
            ModelType::Vits => self.run_vits(ids, speaker, speed),
            ModelType::Matcha => self.run_matcha(ids, speaker, speed),
        }
    }
}
