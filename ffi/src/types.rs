//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with a C-compatible representation. Enum
//! discriminants are explicit and stable. `FfiOutcome` is only ever lent to
//! the host for the duration of a callback; its strings are owned by an
//! `OwnedOutcome` on the Rust side and freed when the callback returns.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use courier_core::{HttpClient, HttpMethod, Outcome, RequestError, RequestHandle, SerializerType};

/// Opaque handle to an `HttpClient`.
pub struct FfiHttpClient {
    pub(crate) inner: HttpClient,
}

/// Opaque handle to one request.
pub struct FfiRequest {
    pub(crate) inner: RequestHandle,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Post = 0,
    Get = 1,
    Put = 2,
    Delete = 3,
    Patch = 4,
}

impl FfiHttpMethod {
    /// Checked conversion from the raw value a C caller passed.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FfiHttpMethod::Post),
            1 => Some(FfiHttpMethod::Get),
            2 => Some(FfiHttpMethod::Put),
            3 => Some(FfiHttpMethod::Delete),
            4 => Some(FfiHttpMethod::Patch),
            _ => None,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
            FfiHttpMethod::Patch => HttpMethod::Patch,
        }
    }
}

/// Body serializer as a C enum.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiSerializerType {
    Default = 0,
    Json = 1,
}

impl FfiSerializerType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FfiSerializerType::Default),
            1 => Some(FfiSerializerType::Json),
            _ => None,
        }
    }
}

impl From<FfiSerializerType> for SerializerType {
    fn from(s: FfiSerializerType) -> Self {
        match s {
            FfiSerializerType::Default => SerializerType::Default,
            FfiSerializerType::Json => SerializerType::Json,
        }
    }
}

/// Error codes reported in `FfiOutcome`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    Cancelled = 2,
    Timeout = 3,
    Transport = 4,
    Server = 5,
    Serialization = 6,
    Decode = 7,
    BodyTooLarge = 8,
}

impl From<&RequestError> for FfiErrorCode {
    fn from(err: &RequestError) -> Self {
        match err {
            RequestError::InvalidArgument(_) => FfiErrorCode::InvalidArgument,
            RequestError::Cancelled => FfiErrorCode::Cancelled,
            RequestError::Timeout => FfiErrorCode::Timeout,
            RequestError::Transport(_) => FfiErrorCode::Transport,
            RequestError::Server { .. } => FfiErrorCode::Server,
            RequestError::Serialization(_) => FfiErrorCode::Serialization,
            RequestError::Decode(_) => FfiErrorCode::Decode,
            RequestError::BodyTooLarge { .. } => FfiErrorCode::BodyTooLarge,
        }
    }
}

/// The outcome of a request as seen by C.
///
/// On success `error_code` is `Ok`, `error_message` is null and `body`
/// points at `body_len` bytes of response body, which may be binary and are
/// not NUL-terminated. On failure `error_message` describes the error; for
/// `Server` errors `http_status` and `body` carry the server's answer.
/// Otherwise `body` is null and `body_len` is 0.
/// All pointers are valid only for the duration of the callback.
#[repr(C)]
pub struct FfiOutcome {
    pub error_code: FfiErrorCode,
    pub error_message: *const c_char,
    pub http_status: u16,
    pub body: *const u8,
    pub body_len: usize,
}

/// Completion callback. `outcome` is borrowed for the duration of the call.
pub type FfiCallback = extern "C" fn(user_data: *mut c_void, outcome: *const FfiOutcome);

/// Host context pointer carried to the callback thread.
pub(crate) struct UserData(*mut c_void);

// SAFETY: the pointer is never dereferenced on the Rust side; the host
// promises it is usable from the callback thread.
unsafe impl Send for UserData {}

impl UserData {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

/// Owns the C strings an `FfiOutcome` points into.
pub(crate) struct OwnedOutcome {
    code: FfiErrorCode,
    status: u16,
    message: Option<CString>,
    body: Option<Vec<u8>>,
}

impl OwnedOutcome {
    pub(crate) fn new(outcome: &Outcome) -> Self {
        match outcome {
            Ok(response) => Self {
                code: FfiErrorCode::Ok,
                status: response.status,
                message: None,
                body: Some(response.body.clone()),
            },
            Err(err) => {
                let body = match err {
                    RequestError::Server { body, .. } => Some(body.clone()),
                    _ => None,
                };
                Self {
                    code: err.into(),
                    status: err.status().unwrap_or(0),
                    message: Some(c_string(&err.to_string())),
                    body,
                }
            }
        }
    }

    pub(crate) fn as_ffi(&self) -> FfiOutcome {
        FfiOutcome {
            error_code: self.code,
            error_message: self.message.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
            http_status: self.status,
            body: self.body.as_ref().map_or(std::ptr::null(), |b| b.as_ptr()),
            body_len: self.body.as_ref().map_or(0, Vec::len),
        }
    }
}

/// C strings cannot hold interior NULs; drop them rather than fail.
fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use courier_core::HttpResponse;

    use super::*;

    fn body(ffi: &FfiOutcome) -> &[u8] {
        unsafe { std::slice::from_raw_parts(ffi.body, ffi.body_len) }
    }

    #[test]
    fn success_outcome_exposes_body() {
        let owned = OwnedOutcome::new(&Ok(HttpResponse {
            status: 201,
            headers: Vec::new(),
            body: b"created".to_vec(),
        }));
        let ffi = owned.as_ffi();
        assert_eq!(ffi.error_code, FfiErrorCode::Ok);
        assert_eq!(ffi.http_status, 201);
        assert!(ffi.error_message.is_null());
        assert_eq!(body(&ffi), b"created");
    }

    #[test]
    fn binary_body_passes_through_intact() {
        let bytes = vec![0x89, b'P', b'N', b'G', 0x00, 0xff, 0xfe];
        let owned = OwnedOutcome::new(&Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: bytes.clone(),
        }));
        let ffi = owned.as_ffi();
        assert_eq!(ffi.body_len, bytes.len());
        assert_eq!(body(&ffi), bytes.as_slice());
    }

    #[test]
    fn server_error_outcome_carries_status_and_body() {
        let owned = OwnedOutcome::new(&Err(RequestError::Server {
            status: 500,
            body: b"boom".to_vec(),
        }));
        let ffi = owned.as_ffi();
        assert_eq!(ffi.error_code, FfiErrorCode::Server);
        assert_eq!(ffi.http_status, 500);
        assert_eq!(body(&ffi), b"boom");
        assert_eq!(
            unsafe { CStr::from_ptr(ffi.error_message) }.to_str().unwrap(),
            "HTTP 500: boom"
        );
    }

    #[test]
    fn cancelled_outcome_has_no_body() {
        let owned = OwnedOutcome::new(&Err(RequestError::Cancelled));
        let ffi = owned.as_ffi();
        assert_eq!(ffi.error_code, FfiErrorCode::Cancelled);
        assert_eq!(ffi.http_status, 0);
        assert!(ffi.body.is_null());
        assert_eq!(ffi.body_len, 0);
        assert!(!ffi.error_message.is_null());
    }

    #[test]
    fn oversized_body_has_its_own_code() {
        let err = RequestError::BodyTooLarge { limit: 16 };
        assert_eq!(FfiErrorCode::from(&err), FfiErrorCode::BodyTooLarge);
    }

    #[test]
    fn interior_nul_is_stripped() {
        assert_eq!(c_string("a\0b").to_str().unwrap(), "ab");
    }

    #[test]
    fn method_discriminants_are_stable() {
        assert_eq!(FfiHttpMethod::Post as i32, 0);
        assert_eq!(FfiHttpMethod::Patch as i32, 4);
        assert_eq!(HttpMethod::from(FfiHttpMethod::Delete), HttpMethod::Delete);
    }

    #[test]
    fn raw_values_are_checked() {
        assert_eq!(FfiHttpMethod::from_raw(1), Some(FfiHttpMethod::Get));
        assert_eq!(FfiHttpMethod::from_raw(5), None);
        assert_eq!(FfiSerializerType::from_raw(1), Some(FfiSerializerType::Json));
        assert_eq!(FfiSerializerType::from_raw(2), None);
    }
}
