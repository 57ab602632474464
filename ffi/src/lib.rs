//! C-ABI wrapper around `courier-core`.
//!
//! # Overview
//! Lets a C or Objective-C host build requests, start and cancel them, and
//! receive outcomes through a plain function pointer, without linking to
//! Rust's async runtime or serde directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Headers and params cross the boundary as JSON text; method and
//!   serializer as raw integers checked against `FfiHttpMethod` and
//!   `FfiSerializerType`.
//! - Callbacks run on the client's callback thread and receive a borrowed
//!   `FfiOutcome`. `user_data` must stay valid until the callback has fired.
//! - The caller owns every returned pointer and must release it with the
//!   matching `courier_*_free` function. Freeing a request does not cancel it.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::Utf8Error;
use std::time::Duration;

use courier_core::{ClientConfig, Headers, HttpClient, RequestSpec};

use types::*;

/// Bytes of a nullable C string, without the terminator.
fn read_bytes<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_bytes())
    }
}

/// Read a nullable C string as UTF-8.
fn read_str<'a>(ptr: *const c_char) -> Option<Result<&'a str, Utf8Error>> {
    read_bytes(ptr).map(std::str::from_utf8)
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Borrow the process-wide client.
///
/// The returned pointer must be released with `courier_client_free`; doing
/// so does not shut the shared client down.
#[unsafe(no_mangle)]
pub extern "C" fn courier_client_shared() -> *mut FfiHttpClient {
    catch_unwind(AssertUnwindSafe(|| {
        let client = HttpClient::shared().clone();
        Box::into_raw(Box::new(FfiHttpClient { inner: client }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Create an independent client.
///
/// `base_url` may be null. A `timeout_ms` of 0 keeps the default timeout.
/// Returns null if `base_url` is not UTF-8 or the client could not be
/// started.
#[unsafe(no_mangle)]
pub extern "C" fn courier_client_new(base_url: *const c_char, timeout_ms: u64) -> *mut FfiHttpClient {
    catch_unwind(AssertUnwindSafe(|| {
        let mut config = ClientConfig::default();
        match read_str(base_url) {
            None => {}
            Some(Ok(url)) => config = config.with_base_url(url),
            Some(Err(e)) => {
                tracing::warn!(target: "courier_ffi", "Rejecting base url: {}", e);
                return std::ptr::null_mut();
            }
        }
        if timeout_ms > 0 {
            config = config.with_timeout(Duration::from_millis(timeout_ms));
        }
        match HttpClient::new(config) {
            Ok(client) => Box::into_raw(Box::new(FfiHttpClient { inner: client })),
            Err(e) => {
                tracing::warn!(target: "courier_ffi", "Failed to create client: {}", e);
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client returned by `courier_client_new` or `courier_client_shared`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn courier_client_free(client: *mut FfiHttpClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// Current default timeout in milliseconds, or 0 if `client` is null.
#[unsafe(no_mangle)]
pub extern "C" fn courier_client_timeout_ms(client: *const FfiHttpClient) -> u64 {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return 0;
        }
        let client = unsafe { &*client };
        u64::try_from(client.inner.timeout().as_millis()).unwrap_or(u64::MAX)
    }))
    .unwrap_or(0)
}

/// Set the timeout for requests created from now on.
///
/// Returns false if `client` is null or `timeout_ms` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn courier_client_set_timeout_ms(client: *const FfiHttpClient, timeout_ms: u64) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || timeout_ms == 0 {
            return false;
        }
        let client = unsafe { &*client };
        client.inner.set_timeout(Duration::from_millis(timeout_ms));
        true
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Build a request. It does nothing until `courier_request_start`.
///
/// - `headers_json`: null or a JSON object of string values.
/// - `params_json`: null or a JSON object; anything else, invalid UTF-8
///   included, is reported as a `Serialization` error when the request
///   starts.
/// - `method`: an `FfiHttpMethod` value; `serializer`: an `FfiSerializerType`.
/// - `callback`: may be null to ignore the outcome.
///
/// Returns null if `client` or `url` is null, or if `headers_json`, `method`
/// or `serializer` is invalid. Problems with the URL itself, invalid UTF-8
/// included, are reported through the callback as `InvalidArgument`.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn courier_request_new(
    client: *const FfiHttpClient,
    url: *const c_char,
    headers_json: *const c_char,
    params_json: *const c_char,
    method: u32,
    serializer: u32,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> *mut FfiRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let Some(url) = read_bytes(url) else {
            return std::ptr::null_mut();
        };
        let (Some(method), Some(serializer)) = (
            FfiHttpMethod::from_raw(method),
            FfiSerializerType::from_raw(serializer),
        ) else {
            return std::ptr::null_mut();
        };
        let headers = match read_bytes(headers_json) {
            None => Headers::new(),
            Some(json) => match serde_json::from_slice::<Headers>(json) {
                Ok(headers) => headers,
                Err(e) => {
                    tracing::warn!(target: "courier_ffi", "Rejecting headers JSON: {}", e);
                    return std::ptr::null_mut();
                }
            },
        };

        let mut spec = RequestSpec::from_url_bytes(url, method.into())
            .headers(headers)
            .serializer(serializer.into());
        if let Some(json) = read_bytes(params_json) {
            spec = spec.params_json(json);
        }

        let user_data = UserData::new(user_data);
        let client = unsafe { &*client };
        let handle = client.inner.request_spec(spec, move |_, outcome| {
            if let Some(callback) = callback {
                let owned = OwnedOutcome::new(&outcome);
                let ffi = owned.as_ffi();
                callback(user_data.as_ptr(), &ffi);
            }
        });
        Box::into_raw(Box::new(FfiRequest { inner: handle }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Start a request. No-op unless it was just created. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn courier_request_start(request: *const FfiRequest) {
    if !request.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { &*request }.inner.start()));
    }
}

/// Cancel a request. No-op once it has finished. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn courier_request_cancel(request: *const FfiRequest) {
    if !request.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { &*request }.inner.cancel()));
    }
}

/// True while the exchange is in flight.
#[unsafe(no_mangle)]
pub extern "C" fn courier_request_running(request: *const FfiRequest) -> bool {
    if request.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*request }.inner.running())).unwrap_or(false)
}

/// True once the request completed with a response or an error.
/// Cancelled requests are not finished.
#[unsafe(no_mangle)]
pub extern "C" fn courier_request_finished(request: *const FfiRequest) -> bool {
    if request.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*request }.inner.finished())).unwrap_or(false)
}

/// Release a request handle. Does not cancel it. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn courier_request_free(request: *mut FfiRequest) {
    if !request.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(request) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
