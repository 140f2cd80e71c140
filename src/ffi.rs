//! Flat C ABI
//!
//! Every string handed out here is allocated by Rust and must be released
//! with [`media_probe_free`]. A null result means "nothing to report".
//! Entry points that open containers need the `ffmpeg` feature; the palette
//! entry points are always exported.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
#[cfg(feature = "ffmpeg")]
use std::os::raw::c_int;
use std::path::Path;

use crate::pipeline;

/// Owned C string, dropping interior NULs instead of failing.
fn into_c_string(text: String) -> *mut c_char {
    let bytes: Vec<u8> = text.into_bytes().into_iter().filter(|b| *b != 0).collect();
    match CString::new(bytes) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn into_c_string_opt(text: Option<String>) -> *mut c_char {
    text.map(into_c_string).unwrap_or(std::ptr::null_mut())
}

/// Borrow an optional C string argument; null reads as empty.
unsafe fn arg<'a>(ptr: *const c_char) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

unsafe fn store(out: *mut *mut c_char, value: Option<String>) {
    if !out.is_null() {
        *out = into_c_string_opt(value);
    }
}

/// Release a string returned by this library. Null is ignored.
///
/// # Safety
///
/// `ptr` must come from one of the `media_probe_*` functions and must not be
/// freed twice.
#[no_mangle]
pub unsafe extern "C" fn media_probe_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Probe `locator`, write its JSON description to `out_json` and, when
/// `picture` is non-empty, extract the cover picture.
///
/// Returns `-1` when the resource cannot be opened, otherwise the picture
/// tier (0, 1 or 2).
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings;
/// `out_json` must be a valid pointer and `out_log` null or valid.
#[cfg(feature = "ffmpeg")]
#[no_mangle]
pub unsafe extern "C" fn media_probe_get_media_info(
    locator: *const c_char,
    headers: *const c_char,
    picture: *const c_char,
    thumbnail: *const c_char,
    out_json: *mut *mut c_char,
    out_log: *mut *mut c_char,
) -> c_int {
    assert!(!out_json.is_null(), "out_json must not be null");

    let backend = crate::FfmpegBackend::new();
    let outcome = pipeline::get_media_info(&backend, &arg(locator), &arg(headers), &arg(picture), &arg(thumbnail));

    store(out_json, outcome.json);
    store(out_log, outcome.log);
    outcome.status
}

/// Extract only the cover picture of `locator`; returns the picture tier.
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings;
/// `out_log` null or valid.
#[cfg(feature = "ffmpeg")]
#[no_mangle]
pub unsafe extern "C" fn media_probe_get_media_picture(
    locator: *const c_char,
    headers: *const c_char,
    picture: *const c_char,
    thumbnail: *const c_char,
    out_log: *mut *mut c_char,
) -> c_int {
    let backend = crate::FfmpegBackend::new();
    let outcome = pipeline::get_media_picture(&backend, &arg(locator), &arg(headers), &arg(picture), &arg(thumbnail));

    store(out_log, outcome.log);
    outcome.tier.code()
}

/// JSON array of the audio and video codecs of the linked FFmpeg.
#[cfg(feature = "ffmpeg")]
#[no_mangle]
pub extern "C" fn media_probe_get_available_codec_list() -> *mut c_char {
    let backend = crate::FfmpegBackend::new();
    into_c_string(pipeline::available_codecs(&backend).to_string())
}

/// Palette JSON of the image at `path`, null on failure.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string; `out_log` null or valid.
#[no_mangle]
pub unsafe extern "C" fn media_probe_analyze_picture_color(
    path: *const c_char,
    out_log: *mut *mut c_char,
) -> *mut c_char {
    assert!(!path.is_null(), "path must not be null");

    let path = arg(path);
    let outcome = pipeline::analyze_picture_color_from_path(Path::new(path.as_ref()));
    store(out_log, outcome.log.clone());
    into_c_string_opt(outcome.json())
}

/// Palette JSON of `len` encoded image bytes at `data`, null on failure.
///
/// # Safety
///
/// `data` must point to `len` readable bytes; `out_log` null or valid.
#[no_mangle]
pub unsafe extern "C" fn media_probe_analyze_picture_color_data(
    data: *const u8,
    len: usize,
    out_log: *mut *mut c_char,
) -> *mut c_char {
    assert!(!data.is_null() || len == 0, "data must not be null");

    let bytes = if len == 0 { &[][..] } else { std::slice::from_raw_parts(data, len) };
    let outcome = pipeline::analyze_picture_color_from_data(bytes);
    store(out_log, outcome.log.clone());
    into_c_string_opt(outcome.json())
}
