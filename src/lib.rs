//! # runanywhere-native
//!
//! Native bridges that let a managed mobile app drive on-device inference
//! engines through opaque integer handles.
//!
//! * [`llm`]: a language-model handle bridge (load / generate / tokenize /
//!   detokenize / size queries / release), exported to Android over JNI.
//! * [`tts`]: a text-to-speech synthesizer bridge for kitten, vits, kokoro
//!   and matcha models, exported to iOS over a C ABI ([`ffi`]).
//!
//! ## Quick start
//!
//! ```no_run
//! use runanywhere_native::{ModelBridge, GenerationParams};
//!
//! let bridge = ModelBridge::global();
//! let handle = bridge.load("/data/models/tiny.bin");
//! assert_ne!(handle, 0);
//! let reply = bridge.generate(handle, "Hello", &GenerationParams::default());
//! println!("{reply}");
//! bridge.release(handle);
//! ```
//!
//! ```no_run
//! use runanywhere_native::{SynthesisConfig, Synthesizer};
//!
//! let config = SynthesisConfig::parse("/data/models/kokoro", "kokoro", 2, 200).unwrap();
//! let tts = Synthesizer::initialize(config).unwrap();
//! let audio = tts.synthesize("Hello from Rust!", 0, 1.0).unwrap();
//! audio.write_wav(std::path::Path::new("hello.wav")).unwrap();
//! tts.destroy();
//! ```
//!
//! ## Features
//! | Feature | Enables                                                      |
//! |---------|--------------------------------------------------------------|
//! | `onnx`  | ONNX Runtime engine for [`Synthesizer::initialize`]          |
//! | `jni`   | `Java_…_LlamaCppService_00024Companion_native*` exports      |
//! | `espeak`| In-process eSpeak NG phonemiser for kitten / kokoro input    |
//!
//! ## Handles
//! A handle is `(generation << 32) | slot` ([`handle::HandleTable`]).  `0` is
//! never issued, and a released handle stays invalid even after its slot is
//! reused, so stale or foreign handles are rejected instead of dereferenced.

pub mod config;
pub mod error;

// C ABI for iOS: ra_tts_create / ra_tts_synthesize / ra_tts_destroy …
pub mod ffi;

pub mod handle;

#[cfg(feature = "jni")]
pub mod jni;

pub mod llm;
pub mod logging;
pub mod tts;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use error::{BridgeError, Result};
pub use handle::HandleTable;
pub use llm::{GenerationParams, LanguageModel, ModelBridge, ModelLoader, NOT_LOADED};
pub use tts::{AudioBuffer, ModelType, SpeechEngine, SynthesisConfig, Synthesizer};
