//! C ABI. Engines are addressed by opaque `u64` handles; indices and
//! claims travel as UTF-8 JSON. Every call returns an [`ErrorCode`] and, on
//! failure, leaves a message retrievable with `ipam_last_error_message`.

use crate::{
    config::EngineConfig,
    errors::{map_error, set_last_error, Error, ErrorCode},
    handle_registry::{register_handle, unregister_handle, with_handle, HandleId},
    storage::{Context, MemoryStorage},
    types::{Claim, Index, IndexKey},
    Engine,
};
use std::{ffi::CStr, os::raw::c_char, sync::Arc};

// ─────────────────────────── helpers ─────────────────────────────────── //

#[inline]
fn cstr<'a>(p: *const c_char) -> Result<&'a str, ErrorCode> {
    if p.is_null() {
        return Err(ErrorCode::Utf8Error);
    }
    unsafe { CStr::from_ptr(p) }
        .to_str()
        .map_err(|_| ErrorCode::Utf8Error)
}

fn fail(code: ErrorCode, message: &str) -> ErrorCode {
    set_last_error(code, message);
    code
}

fn from_error(e: &Error) -> ErrorCode {
    fail(map_error(e), &e.to_string())
}

/// Copy `json` plus a NUL into `buf`. `*len` holds the capacity on input
/// and the JSON length on output.
fn write_out(json: &str, buf: *mut c_char, len: *mut usize) -> Result<(), ErrorCode> {
    if len.is_null() {
        return Err(ErrorCode::BufferTooSmall);
    }
    let capacity = unsafe { *len };
    unsafe { *len = json.len() };
    if buf.is_null() || capacity <= json.len() {
        return Err(ErrorCode::BufferTooSmall);
    }
    unsafe {
        std::ptr::copy_nonoverlapping(json.as_ptr() as *const c_char, buf, json.len());
        *buf.add(json.len()) = 0;
    }
    Ok(())
}

// ─── small helper to turn Result<T,ErrorCode> into early-return ──────────
macro_rules! try_c { ($expr:expr) => { match $expr {
    Ok(v)  => v,
    Err(code) => return fail(code, code.as_str()),
}}}

macro_rules! try_e { ($expr:expr) => { match $expr {
    Ok(v)  => v,
    Err(e) => return from_error(&e),
}}}

// ───────────────────────── lifetime ──────────────────────────────────── //

/// Open an engine over in-process storage. `config_json` may be NULL.
/// Stores the handle in `*out`.
#[no_mangle]
pub extern "C" fn ipam_open(config_json: *const c_char, out: *mut HandleId) -> ErrorCode {
    if out.is_null() {
        return fail(ErrorCode::InvalidHandle, "out handle pointer is NULL");
    }
    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        try_e!(EngineConfig::from_json(try_c!(cstr(config_json))))
    };
    let engine = Engine::with_config(Arc::new(MemoryStorage::new()), config);
    unsafe { *out = register_handle(engine) };
    ErrorCode::Success
}

#[no_mangle]
pub extern "C" fn ipam_close(h: HandleId) -> ErrorCode {
    try_c!(unregister_handle(h));
    ErrorCode::Success
}

// ───────────────────────── indices ───────────────────────────────────── //

#[no_mangle]
pub extern "C" fn ipam_create_index(h: HandleId, index_json: *const c_char) -> ErrorCode {
    let json = try_c!(cstr(index_json));
    let index: Index = try_e!(serde_json::from_str(json).map_err(Error::from));
    try_e!(try_c!(with_handle(h, |e| e.create_index(&Context::new(), &index))));
    ErrorCode::Success
}

#[no_mangle]
pub extern "C" fn ipam_delete_index(h: HandleId, namespace: *const c_char, name: *const c_char) -> ErrorCode {
    let key = IndexKey::new(try_c!(cstr(namespace)), try_c!(cstr(name)));
    try_e!(try_c!(with_handle(h, |e| e.delete_index(&Context::new(), &key))));
    ErrorCode::Success
}

/// Writes the entries of an index as a JSON array.
#[no_mangle]
pub extern "C" fn ipam_entries(
    h: HandleId,
    namespace: *const c_char,
    name: *const c_char,
    out_buf: *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    let key = IndexKey::new(try_c!(cstr(namespace)), try_c!(cstr(name)));
    let entries = try_e!(try_c!(with_handle(h, |e| e.entries(&key))));
    let json = try_e!(serde_json::to_string(&entries).map_err(Error::from));
    try_c!(write_out(&json, out_buf, out_len));
    ErrorCode::Success
}

// ───────────────────────── claims ────────────────────────────────────── //

/// Claim and write the resolved claim (with status) as JSON. When the
/// buffer is too small the claim is still applied; re-claiming with a
/// larger buffer returns the same result.
#[no_mangle]
pub extern "C" fn ipam_claim(
    h: HandleId,
    claim_json: *const c_char,
    out_buf: *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    let json = try_c!(cstr(claim_json));
    let mut claim: Claim = try_e!(serde_json::from_str(json).map_err(Error::from));
    try_e!(try_c!(with_handle(h, |e| e.claim(&Context::new(), &mut claim))));
    let out = try_e!(serde_json::to_string(&claim).map_err(Error::from));
    try_c!(write_out(&out, out_buf, out_len));
    ErrorCode::Success
}

#[no_mangle]
pub extern "C" fn ipam_release(h: HandleId, claim_json: *const c_char) -> ErrorCode {
    let json = try_c!(cstr(claim_json));
    let claim: Claim = try_e!(serde_json::from_str(json).map_err(Error::from));
    try_e!(try_c!(with_handle(h, |e| e.release(&Context::new(), &claim))));
    ErrorCode::Success
}
