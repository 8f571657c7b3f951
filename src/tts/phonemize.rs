//! Grapheme-to-phoneme conversion through the `libespeak-ng` C API
//! (feature `espeak`).
//!
//! The library is called in-process rather than through the `espeak-ng`
//! binary, since iOS forbids spawning processes and Android ships no binary.
//! Output matches `espeak-ng --ipa -q -v en-us`, the phoneme set kitten and
//! kokoro models were trained on.
//!
//! On iOS and Android bundle `espeak-ng-data/` with the app and call
//! [`set_data_path`] (or `ra_tts_set_espeak_data_path` over the C ABI) before
//! the first synthesis.  Linking is handled by `build.rs`.

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_int, c_void},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

extern "C" {
    /// Directory containing `espeak-ng-data/`; `NULL` for the compiled-in default.
    fn espeak_ng_InitializePath(path: *const c_char);

    /// Returns `ENS_OK` (0) on success.
    fn espeak_ng_Initialize(context: *mut c_void) -> c_int;

    /// Returns `EE_OK` (0) on success.
    fn espeak_ng_SetVoiceByName(name: *const c_char) -> c_int;

    /// Translates one clause per call.  `textptr` is advanced past the clause
    /// and set to `NULL` at the end of input.  The returned buffer is reused
    /// by the next call.
    fn espeak_TextToPhonemes(textptr: *mut *const c_void, textmode: c_int, phonememode: c_int) -> *const c_char;
}

const CHARS_UTF8: c_int = 1;
const PHONEMES_IPA: c_int = 0x02;
const VOICE: &str = "en-us";

/// espeak-ng keeps global state; every call goes through this lock.
static LOCK: Mutex<()> = Mutex::new(());

static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

static DATA_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Point the library at a bundled `espeak-ng-data/` directory.
///
/// Only the first call counts, and only if made before the first
/// [`phonemize`].  Returns `false` when a path was already set.
pub fn set_data_path(path: &Path) -> bool {
    let accepted = DATA_PATH.set(path.to_path_buf()).is_ok();
    if accepted {
        info!(path = %path.display(), "espeak-ng data path set");
    } else {
        warn!(path = %path.display(), "espeak-ng data path already set; ignored");
    }
    accepted
}

fn initialize() -> std::result::Result<(), String> {
    let path = DATA_PATH
        .get()
        .map(|p| CString::new(p.to_string_lossy().as_bytes()))
        .transpose()
        .map_err(|_| "espeak-ng data path contains a nul byte".to_string())?;
    let voice = CString::new(VOICE).map_err(|e| e.to_string())?;

    unsafe {
        espeak_ng_InitializePath(path.as_ref().map_or(std::ptr::null(), |p| p.as_ptr()));
        let status = espeak_ng_Initialize(std::ptr::null_mut());
        if status != 0 {
            return Err(format!("espeak_ng_Initialize failed (status {status:#010x})"));
        }
        let rc = espeak_ng_SetVoiceByName(voice.as_ptr());
        if rc != 0 {
            return Err(format!("espeak_ng_SetVoiceByName({VOICE:?}) failed (rc {rc})"));
        }
    }
    info!(voice = VOICE, "espeak-ng initialised");
    Ok(())
}

/// `true` once the library has initialised.  On mobile this stays `false`
/// until [`set_data_path`] names a valid directory.
pub fn is_available() -> bool {
    let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
    INIT.get_or_init(initialize).is_ok()
}

/// `text` → IPA, clauses joined by a space.
pub fn phonemize(text: &str) -> Result<String> {
    let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
    INIT.get_or_init(initialize)
        .as_ref()
        .map_err(|e| anyhow!("espeak-ng: {e}"))?;

    let text = CString::new(text).map_err(|_| anyhow!("text contains a nul byte"))?;
    let mut cursor = text.as_ptr() as *const c_void;
    let mut clauses = Vec::new();

    while !cursor.is_null() {
        let phonemes = unsafe { espeak_TextToPhonemes(&mut cursor, CHARS_UTF8, PHONEMES_IPA) };
        if phonemes.is_null() {
            continue;
        }
        let clause = unsafe { CStr::from_ptr(phonemes) }
            .to_str()
            .map_err(|_| anyhow!("espeak-ng returned non-UTF-8 phonemes"))?
            .trim();
        if !clause.is_empty() {
            clauses.push(clause.to_owned());
        }
    }
    Ok(clauses.join(" "))
}
