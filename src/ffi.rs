//! C ABI bridging [`Synthesizer`] to iOS callers.
//!
//! Functions are `#[no_mangle] extern "C"` so Swift can call them through a
//! bridging header.  Synthesizers are addressed by the non-zero `int64_t`
//! handle returned from [`ra_tts_create`]; a destroyed or foreign handle makes
//! every call return its sentinel (`0`, `NULL`, `false`).
//!
//! ## Memory contract
//!
//! | Function                            | Caller frees with        |
//! |-------------------------------------|--------------------------|
//! | [`ra_tts_create`]                   | [`ra_tts_destroy`]       |
//! | [`ra_tts_synthesize`]               | [`ra_audio_free`]        |
//! | [`ra_tts_synthesize_with_progress`] | [`ra_audio_free`]        |
//! | [`ra_tts_speaker_name`]             | [`ra_free_string`]       |
//!
//! ## Threading
//!
//! Calls block.  Run synthesis off the main thread.  The progress callback
//! runs on the synthesizing thread and never after the call returns.
//! [`ra_tts_destroy`] waits for synthesis already running on the handle.

use std::ffi::{c_char, c_void, CStr, CString};

use once_cell::sync::Lazy;
use tracing::warn;

use crate::error::guarded;
use crate::handle::HandleTable;
use crate::logging;
use crate::tts::{AudioBuffer, SynthesisConfig, Synthesizer};

static SYNTHESIZERS: Lazy<HandleTable<Synthesizer>> = Lazy::new(HandleTable::new);

/// PCM float32 mono audio owned by the caller until [`ra_audio_free`].
#[repr(C)]
pub struct RaAudio {
    pub samples: *mut f32,
    pub len: usize,
    pub sample_rate: u32,
}

/// Progress callback: fraction of chunks completed in `[0, 1]`.
pub type RaProgressCallback = Option<unsafe extern "C" fn(progress: f32, user_data: *mut c_void)>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a `*const c_char` to an owned `String`; `None` if `ptr` is null.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string.  Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

fn into_raw_audio(audio: AudioBuffer) -> *mut RaAudio {
    let samples = audio.samples.into_boxed_slice();
    let len = samples.len();
    let samples = Box::into_raw(samples) as *mut f32;
    Box::into_raw(Box::new(RaAudio { samples, len, sample_rate: audio.sample_rate }))
}

/// Register an already-built synthesizer and return its handle.
pub(crate) fn register(synth: Synthesizer) -> i64 {
    SYNTHESIZERS.insert(synth)
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Install the crate's log subscriber (filtered by `RUST_LOG`).
///
/// Optional; call once at app start.  Returns `false` if the host already
/// installed one.
#[no_mangle]
pub extern "C" fn ra_init_logging() -> bool {
    guarded("ra_init_logging", false, logging::init)
}

/// Load a synthesizer.
///
/// @param model_path           UTF-8 path to the model directory.
/// @param model_type           `"kitten"`, `"vits"`, `"kokoro"` or `"matcha"`.
/// @param num_threads          Inference threads (>= 1).
/// @param max_sentence_length  Chunk bound in characters (>= 1).
/// @return                     Handle, or `0` on failure (details in the log).
///                             Release with [`ra_tts_destroy`].
#[no_mangle]
pub unsafe extern "C" fn ra_tts_create(
    model_path: *const c_char,
    model_type: *const c_char,
    num_threads: i64,
    max_sentence_length: i64,
) -> i64 {
    guarded("ra_tts_create", 0, || {
        let (Some(path), Some(kind)) =
            (unsafe { cstr_to_string(model_path) }, unsafe { cstr_to_string(model_type) })
        else {
            warn!("ra_tts_create: null argument");
            return 0;
        };
        let created = SynthesisConfig::parse(&path, &kind, num_threads, max_sentence_length)
            .and_then(Synthesizer::initialize);
        match created {
            Ok(synth) => register(synth),
            Err(e) => {
                warn!("ra_tts_create: {e}");
                0
            }
        }
    })
}

/// Synthesize `text` with speaker `speaker_id` at `speed` (1.0 = normal).
///
/// @return  Audio, or `NULL` on invalid handle, invalid speaker, or
///          synthesis error.  Free with [`ra_audio_free`].
#[no_mangle]
pub unsafe extern "C" fn ra_tts_synthesize(
    handle: i64,
    text: *const c_char,
    speaker_id: i64,
    speed: f32,
) -> *mut RaAudio {
    unsafe { ra_tts_synthesize_with_progress(handle, text, speaker_id, speed, None, std::ptr::null_mut()) }
}

/// Same as [`ra_tts_synthesize`], reporting progress through `callback`.
///
/// `callback` may be null.  `user_data` is passed through untouched.
///
/// `callback` may call the accessors (`ra_tts_num_speakers`,
/// `ra_tts_sample_rate`, `ra_tts_is_valid_speaker`, `ra_tts_speaker_name`)
/// on the same handle.  It must not synthesize on the same handle: such a
/// call returns `NULL`.  Calling [`ra_tts_destroy`] from it invalidates the
/// handle, and the model is released once this call returns.
#[no_mangle]
pub unsafe extern "C" fn ra_tts_synthesize_with_progress(
    handle: i64,
    text: *const c_char,
    speaker_id: i64,
    speed: f32,
    callback: RaProgressCallback,
    user_data: *mut c_void,
) -> *mut RaAudio {
    guarded("ra_tts_synthesize", std::ptr::null_mut(), || {
        let Some(text) = (unsafe { cstr_to_string(text) }) else {
            warn!("ra_tts_synthesize: null text");
            return std::ptr::null_mut();
        };
        let synth = match SYNTHESIZERS.get(handle) {
            Ok(s) => s,
            Err(e) => {
                warn!("ra_tts_synthesize: {e}");
                return std::ptr::null_mut();
            }
        };
        let report = |p: f32| {
            if let Some(cb) = callback {
                unsafe { cb(p, user_data) };
            }
        };
        match synth.synthesize_with_progress(&text, speaker_id, speed, report) {
            Ok(audio) => into_raw_audio(audio),
            Err(e) => {
                warn!("ra_tts_synthesize: {e}");
                std::ptr::null_mut()
            }
        }
    })
}

/// Directory of the bundled `espeak-ng-data/`.  Call before the first
/// kitten / kokoro synthesis on iOS.  Returns `false` for a null path or if a
/// path was already set.
#[cfg(feature = "espeak")]
#[no_mangle]
pub unsafe extern "C" fn ra_tts_set_espeak_data_path(path: *const c_char) -> bool {
    guarded("ra_tts_set_espeak_data_path", false, || match unsafe { cstr_to_string(path) } {
        Some(path) => crate::tts::phonemize::set_data_path(std::path::Path::new(&path)),
        None => {
            warn!("ra_tts_set_espeak_data_path: null path");
            false
        }
    })
}

/// Number of speakers; `0` for an invalid handle.
#[no_mangle]
pub extern "C" fn ra_tts_num_speakers(handle: i64) -> i64 {
    guarded("ra_tts_num_speakers", 0, || {
        SYNTHESIZERS
            .get(handle)
            .and_then(|s| s.num_speakers())
            .map_or(0, |n| i64::try_from(n).unwrap_or(i64::MAX))
    })
}

/// Output sample rate in Hz; `0` for an invalid handle.
#[no_mangle]
pub extern "C" fn ra_tts_sample_rate(handle: i64) -> i64 {
    guarded("ra_tts_sample_rate", 0, || {
        SYNTHESIZERS.get(handle).and_then(|s| s.sample_rate()).map_or(0, i64::from)
    })
}

/// `0 <= speaker_id < ra_tts_num_speakers(handle)`.
#[no_mangle]
pub extern "C" fn ra_tts_is_valid_speaker(handle: i64, speaker_id: i64) -> bool {
    guarded("ra_tts_is_valid_speaker", false, || {
        SYNTHESIZERS.get(handle).is_ok_and(|s| s.is_valid_speaker(speaker_id))
    })
}

/// Speaker name, or `NULL` if the model has none or the id is invalid.
/// Free with [`ra_free_string`].
#[no_mangle]
pub extern "C" fn ra_tts_speaker_name(handle: i64, speaker_id: i64) -> *const c_char {
    guarded("ra_tts_speaker_name", std::ptr::null(), || {
        match SYNTHESIZERS.get(handle).ok().and_then(|s| s.speaker_name(speaker_id)) {
            Some(name) => to_c_str(&name),
            None => std::ptr::null(),
        }
    })
}

/// Destroy a synthesizer.  Safe on `0` and on already-destroyed handles.
///
/// Blocks until synthesis in progress on other threads has finished.
#[no_mangle]
pub extern "C" fn ra_tts_destroy(handle: i64) {
    guarded("ra_tts_destroy", (), || {
        if let Some(synth) = SYNTHESIZERS.remove(handle) {
            synth.destroy();
        }
    })
}

/// Free audio returned by [`ra_tts_synthesize`].
#[no_mangle]
pub unsafe extern "C" fn ra_audio_free(audio: *mut RaAudio) {
    if audio.is_null() {
        return;
    }
    let audio = unsafe { Box::from_raw(audio) };
    if !audio.samples.is_null() {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(audio.samples, audio.len)) });
    }
}

/// Free a string returned by [`ra_tts_speaker_name`].
#[no_mangle]
pub unsafe extern "C" fn ra_free_string(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}
