//! Turns a `RequestSpec` into a `PreparedRequest`.
//!
//! # Design
//! Parameters are held as a JSON object (`Params`) regardless of how they
//! were supplied. From there:
//! - GET and DELETE always put them in the query string, form-encoded.
//! - POST, PUT and PATCH put them in the body, form-encoded for
//!   `SerializerType::Default` or as a JSON object for `SerializerType::Json`.
//!
//! Form encoding flattens nested values the way Rails-style servers expect:
//! `user[name]=a` for objects and `tags[]=x&tags[]=y` for arrays.

use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::client::{Headers, Params, RequestSpec};
use crate::config::ClientConfig;
use crate::error::RequestError;
use crate::http::{PreparedRequest, SerializerType};

/// Resolve a `RequestSpec` against the client configuration.
pub(crate) fn prepare(spec: RequestSpec, config: &ClientConfig) -> Result<PreparedRequest, RequestError> {
    let RequestSpec {
        url,
        headers,
        params,
        method,
        serializer,
    } = spec;

    let mut url = resolve_url(&url?, config.base_url.as_deref())?;
    let params = params?;
    let mut headers = merge_headers(&config.default_headers, &headers);

    let mut body = None;
    if let Some(params) = params {
        if method.carries_body() {
            body = encode_body(&params, serializer)?;
            if body.is_some() && !has_header(&headers, "Content-Type") {
                headers.push(("Content-Type".to_string(), serializer.content_type().to_string()));
            }
        } else {
            append_query(&mut url, &form_encode(&params));
        }
    }

    Ok(PreparedRequest {
        method,
        url: url.into(),
        headers,
        body,
    })
}

/// Parse `raw`, joining it onto `base` when it is relative.
pub(crate) fn resolve_url(raw: &str, base: Option<&str>) -> Result<Url, RequestError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RequestError::InvalidArgument("url is empty".to_string()));
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base.ok_or_else(|| {
                RequestError::InvalidArgument(format!("relative url {raw:?} without a base url"))
            })?;
            Url::parse(base)?.join(raw)?
        }
        Err(e) => return Err(e.into()),
    };

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RequestError::InvalidArgument(format!(
            "unsupported url scheme {other:?}"
        ))),
    }
}

/// Defaults first, then caller headers replacing any default with the same
/// name (compared case-insensitively).
pub(crate) fn merge_headers(defaults: &Headers, overrides: &Headers) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = defaults
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (name, value) in overrides {
        merged.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        merged.push((name.clone(), value.clone()));
    }
    merged
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Encode body parameters. An empty form yields no body at all.
pub(crate) fn encode_body(params: &Params, serializer: SerializerType) -> Result<Option<String>, RequestError> {
    match serializer {
        SerializerType::Default => {
            let encoded = form_encode(params);
            Ok((!encoded.is_empty()).then_some(encoded))
        }
        SerializerType::Json => serde_json::to_string(params)
            .map(Some)
            .map_err(|e| RequestError::Serialization(e.to_string())),
    }
}

/// `application/x-www-form-urlencoded` encoding of `params`.
pub fn form_encode(params: &Params) -> String {
    let mut ser = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        append_form_value(&mut ser, key, value);
    }
    ser.finish()
}

fn append_form_value(ser: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (sub, v) in map {
                append_form_value(ser, &format!("{key}[{sub}]"), v);
            }
        }
        Value::Array(items) => {
            let key = format!("{key}[]");
            for v in items {
                append_form_value(ser, &key, v);
            }
        }
        Value::String(s) => {
            ser.append_pair(key, s);
        }
        Value::Number(n) => {
            ser.append_pair(key, &n.to_string());
        }
        Value::Bool(b) => {
            ser.append_pair(key, if *b { "true" } else { "false" });
        }
        Value::Null => {
            ser.append_pair(key, "");
        }
    }
}

fn append_query(url: &mut Url, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    url.set_query(Some(&query));
}
