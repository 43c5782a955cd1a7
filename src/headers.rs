// Typed Content-Disposition response header: marks the payload as a download
// named "upscaled<ext>", with the original upload name carried in the RFC
// 5987 `filename*` parameter.

use headers::{Header, HeaderName, HeaderValue};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

// RFC 5987 attr-char: everything outside it must be percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AttachmentDisposition {
    /// The plain `filename` parameter, e.g. "upscaled.png".
    pub filename: String,
    /// The original upload name, emitted percent-encoded as `filename*`.
    pub original_name: Option<String>,
}

impl Header for AttachmentDisposition {
    fn name() -> &'static HeaderName {
        &axum::http::header::CONTENT_DISPOSITION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let raw = value.to_str().map_err(|_| headers::Error::invalid())?;

        let mut parts = raw.split(';').map(str::trim);
        if parts.next() != Some("attachment") {
            return Err(headers::Error::invalid());
        }

        let mut filename = None;
        let mut original_name = None;
        for part in parts {
            if let Some(rest) = part.strip_prefix("filename=") {
                filename = Some(rest.trim_matches('"').to_string());
            } else if let Some(rest) = part.strip_prefix("filename*=UTF-8''") {
                let decoded = percent_decode_str(rest)
                    .decode_utf8()
                    .map_err(|_| headers::Error::invalid())?;
                original_name = Some(decoded.into_owned());
            }
        }

        Ok(AttachmentDisposition {
            filename: filename.ok_or_else(headers::Error::invalid)?,
            original_name,
        })
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let mut str = format!("attachment; filename=\"{}\"", self.filename);
        if let Some(original) = &self.original_name {
            str.push_str(";filename*=UTF-8''");
            str.push_str(&utf8_percent_encode(original, ATTR_CHAR).to_string());
        }

        if let Ok(value) = HeaderValue::from_str(&str) {
            values.extend(std::iter::once(value));
        }
    }
}
