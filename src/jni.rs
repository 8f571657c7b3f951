//! JNI exports for the Android `LlamaCppService` companion object.
//!
//! Kotlin side:
//!
//! ```kotlin
//! companion object {
//!     init { System.loadLibrary("runanywhere_native") }
//!     external fun nativeLoadModel(path: String): Long
//!     external fun nativeGenerate(ptr: Long, prompt: String, maxTokens: Int,
//!                                 temperature: Float, topP: Float, topK: Int): String
//!     external fun nativeTokenize(ptr: Long, text: String): IntArray?
//!     external fun nativeDetokenize(ptr: Long, tokens: IntArray): String
//!     external fun nativeGetVocabSize(ptr: Long): Long
//!     external fun nativeGetContextSize(ptr: Long): Long
//!     external fun nativeGetModelSize(ptr: Long): Long
//!     external fun nativeFreeModel(ptr: Long)
//! }
//! ```
//!
//! Every export forwards to the sentinel form of [`ModelBridge::global`], so
//! a bad handle yields `0`, `null`, `""` or [`NOT_LOADED`] rather than an
//! exception.  Panics are caught here and never cross into the JVM.

use std::ffi::c_void;

use jni::objects::{JIntArray, JObject, JString};
use jni::sys::{jfloat, jint, jintArray, jlong, jsize, jstring, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use tracing::warn;

use crate::error::guarded;
use crate::llm::{GenerationParams, ModelBridge, TokenId, NOT_LOADED};
use crate::logging;

/// Java string → Rust; `None` for `null` or an unreadable string.
fn read_string(env: &mut JNIEnv, s: &JString) -> Option<String> {
    if s.is_null() {
        return None;
    }
    match env.get_string(s) {
        Ok(js) => Some(js.into()),
        Err(e) => {
            warn!("cannot read Java string: {e}");
            None
        }
    }
}

fn read_tokens(env: &mut JNIEnv, arr: &JIntArray) -> jni::errors::Result<Vec<TokenId>> {
    if arr.is_null() {
        return Ok(Vec::new());
    }
    let len = env.get_array_length(arr)?;
    let mut buf = vec![0; usize::try_from(len).unwrap_or(0)];
    env.get_int_array_region(arr, 0, &mut buf)?;
    Ok(buf)
}

fn new_jstring(env: &mut JNIEnv, s: &str) -> jstring {
    match env.new_string(s) {
        Ok(js) => js.into_raw(),
        Err(e) => {
            warn!("cannot create Java string: {e}");
            std::ptr::null_mut()
        }
    }
}

fn new_int_array(env: &mut JNIEnv, ids: &[TokenId]) -> jni::errors::Result<jintArray> {
    let len = jsize::try_from(ids.len()).map_err(|_| jni::errors::Error::WrongJValueType("jsize", "usize"))?;
    let arr = env.new_int_array(len)?;
    env.set_int_array_region(&arr, 0, ids)?;
    Ok(arr.into_raw())
}

/// Installs the log subscriber when the library is loaded.
#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    logging::init();
    JNI_VERSION_1_6
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeLoadModel<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    model_path: JString<'local>,
) -> jlong {
    let Some(path) = read_string(&mut env, &model_path) else {
        warn!("nativeLoadModel: null path");
        return 0;
    };
    guarded("nativeLoadModel", 0, || ModelBridge::global().load(&path))
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeGenerate<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    prompt: JString<'local>,
    max_tokens: jint,
    temperature: jfloat,
    top_p: jfloat,
    top_k: jint,
) -> jstring {
    let prompt = read_string(&mut env, &prompt);
    let params = GenerationParams { max_tokens, temperature, top_p, top_k };
    let reply = guarded("nativeGenerate", NOT_LOADED.to_string(), || {
        generate_reply(ModelBridge::global(), handle, prompt.as_deref(), &params)
    });
    new_jstring(&mut env, &reply)
}

/// A `null` prompt is refused with an error string instead of generating
/// from empty input.
fn generate_reply(bridge: &ModelBridge, handle: jlong, prompt: Option<&str>, params: &GenerationParams) -> String {
    match prompt {
        Some(prompt) => bridge.generate(handle, prompt, params),
        None => {
            warn!("nativeGenerate: null prompt");
            "Error: prompt is null".to_string()
        }
    }
}

/// `null` when the handle is invalid or tokenization fails.
#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeTokenize<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    text: JString<'local>,
) -> jintArray {
    let text = read_string(&mut env, &text).unwrap_or_default();
    let Some(ids) = guarded("nativeTokenize", None, || ModelBridge::global().tokenize(handle, &text)) else {
        return std::ptr::null_mut();
    };
    new_int_array(&mut env, &ids).unwrap_or_else(|e| {
        warn!("nativeTokenize: cannot build int[]: {e}");
        std::ptr::null_mut()
    })
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeDetokenize<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    tokens: JIntArray<'local>,
) -> jstring {
    let text = match read_tokens(&mut env, &tokens) {
        Ok(ids) => guarded("nativeDetokenize", String::new(), || ModelBridge::global().detokenize(handle, &ids)),
        Err(e) => {
            warn!("nativeDetokenize: cannot read int[]: {e}");
            String::new()
        }
    };
    new_jstring(&mut env, &text)
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeGetVocabSize<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) -> jlong {
    guarded("nativeGetVocabSize", 0, || ModelBridge::global().vocab_size(handle))
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeGetContextSize<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) -> jlong {
    guarded("nativeGetContextSize", 0, || ModelBridge::global().context_size(handle))
}

#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeGetModelSize<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) -> jlong {
    guarded("nativeGetModelSize", 0, || ModelBridge::global().model_size(handle))
}

/// Safe to call with `0` or an already-freed handle.
#[no_mangle]
pub extern "system" fn Java_com_runanywhere_runanywhereai_llm_frameworks_LlamaCppService_00024Companion_nativeFreeModel<
    'local,
>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) {
    guarded("nativeFreeModel", (), || {
        ModelBridge::global().release(handle);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ByteModelLoader;

    #[test]
    fn test_null_prompt_is_refused() {
        let bridge = ModelBridge::new(ByteModelLoader);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");
        std::fs::write(&path, b"weights").unwrap();
        let handle = bridge.load(path.to_str().unwrap());
        assert_ne!(handle, 0);

        let params = GenerationParams::default();
        assert_eq!(generate_reply(&bridge, handle, None, &params), "Error: prompt is null");
        let reply = generate_reply(&bridge, handle, Some("Hi"), &params);
        assert!(!reply.starts_with("Error:"), "{reply}");
        bridge.release(handle);
    }

    #[test]
    fn test_null_prompt_on_bad_handle_still_refused() {
        let bridge = ModelBridge::new(ByteModelLoader);
        let params = GenerationParams::default();
        assert_eq!(generate_reply(&bridge, 0, Some("Hi"), &params), NOT_LOADED);
        assert_eq!(generate_reply(&bridge, 0, None, &params), "Error: prompt is null");
    }
}
