/*!
 * Streaming Module
 *
 * Change-only frame delivery. A client polling the screen sends back the
 * fingerprint of the last frame it received; if the fresh capture encodes to
 * the same bytes the server answers "unchanged" instead of resending it.
 */

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::capture::CaptureRegion;
use crate::validation::{parse_area, parse_resize, validate_quality};
use crate::video::EncodedFrame;

/// Parsed parameters of a capture command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Explicit region; `None` means the default area or the full display
    pub area: Option<CaptureRegion>,
    /// JPEG quality; `None` means the configured default
    pub quality: Option<u8>,
    pub resize: Option<(u32, u32)>,
    /// Fingerprint of the frame the client already holds
    pub last_hash: Option<String>,
}

impl CaptureRequest {
    /// Build from the string forms used by query strings and headers.
    pub fn parse(
        area: Option<&str>,
        quality: Option<&str>,
        resize: Option<&str>,
        last_hash: Option<&str>,
    ) -> Result<Self> {
        let quality = match quality {
            Some(q) => {
                let q = q
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("Invalid quality value '{}'", q))?;
                Some(validate_quality(q)?)
            }
            None => None,
        };

        Ok(Self {
            area: parse_area(area)?,
            quality,
            resize: parse_resize(resize)?,
            last_hash: last_hash.filter(|h| !h.is_empty()).map(str::to_string),
        })
    }

    /// Build from a WebSocket params object.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let quality = match params.get("quality") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(q) => Some(q.to_string()),
                None => bail!("Invalid quality value '{}'", n),
            },
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => bail!("Invalid quality value '{}'", other),
        };

        Self::parse(
            string_param(params, "area")?,
            quality.as_deref(),
            string_param(params, "resize")?,
            string_param(params, "last_hash")?,
        )
    }
}

fn string_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<Option<&'a str>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => bail!("Parameter '{}' must be a string, got {}", name, other),
    }
}

/// Result of comparing a fresh frame with the client's fingerprint.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Fresh frame encodes to the bytes the client already has
    Unchanged { fingerprint: String },
    /// New content, timestamped at capture
    Changed { frame: EncodedFrame, date: String },
}

impl CaptureOutcome {
    /// Decide whether `frame` needs to be sent to a client holding `last_hash`.
    pub fn diff(frame: EncodedFrame, last_hash: Option<&str>) -> Self {
        match last_hash {
            Some(hash) if hash == frame.fingerprint => CaptureOutcome::Unchanged {
                fingerprint: frame.fingerprint,
            },
            _ => {
                let date = DateTime::<Utc>::from_timestamp_millis(frame.timestamp_ms as i64)
                    .unwrap_or_else(Utc::now);
                CaptureOutcome::Changed {
                    date: http_date(date),
                    frame,
                }
            }
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            CaptureOutcome::Unchanged { fingerprint } => fingerprint,
            CaptureOutcome::Changed { frame, .. } => &frame.fingerprint,
        }
    }
}

/// Format a timestamp as an HTTP-date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn frame(fingerprint: &str) -> EncodedFrame {
        EncodedFrame {
            data: vec![0xFF, 0xD8],
            fingerprint: fingerprint.to_string(),
            width: 1,
            height: 1,
            timestamp_ms: 784_111_777_000,
        }
    }

    #[test]
    fn http_date_format() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn matching_hash_is_unchanged() {
        let outcome = CaptureOutcome::diff(frame("abc"), Some("abc"));
        assert!(matches!(outcome, CaptureOutcome::Unchanged { ref fingerprint } if fingerprint == "abc"));
    }

    #[test]
    fn differing_or_missing_hash_sends_frame() {
        let outcome = CaptureOutcome::diff(frame("abc"), Some("def"));
        match outcome {
            CaptureOutcome::Changed { frame, date } => {
                assert_eq!(frame.fingerprint, "abc");
                assert_eq!(date, "Sun, 06 Nov 1994 08:49:37 GMT");
            }
            other => panic!("expected a frame, got {:?}", other),
        }
        assert!(matches!(
            CaptureOutcome::diff(frame("abc"), None),
            CaptureOutcome::Changed { .. }
        ));
    }

    #[test]
    fn parses_query_strings() {
        let request =
            CaptureRequest::parse(Some("0,0,800,600"), Some("75"), Some("400,300"), Some("abc"))
                .unwrap();
        assert_eq!(request.area, Some(CaptureRegion::new(0, 0, 800, 600)));
        assert_eq!(request.quality, Some(75));
        assert_eq!(request.resize, Some((400, 300)));
        assert_eq!(request.last_hash.as_deref(), Some("abc"));

        assert_eq!(CaptureRequest::parse(None, None, None, Some("")).unwrap(), CaptureRequest::default());
        assert!(CaptureRequest::parse(None, Some("high"), None, None).is_err());
        assert!(CaptureRequest::parse(None, Some("0"), None, None).is_err());
    }

    #[test]
    fn parses_websocket_params() {
        let params = json!({"area": "10,10,20,20", "quality": 30, "last_hash": "abc"});
        let request = CaptureRequest::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(request.area, Some(CaptureRegion::new(10, 10, 20, 20)));
        assert_eq!(request.quality, Some(30));
        assert_eq!(request.last_hash.as_deref(), Some("abc"));

        let bad = json!({"quality": 2.5});
        assert!(CaptureRequest::from_params(bad.as_object().unwrap()).is_err());
        let bad = json!({"area": [0, 0, 1, 1]});
        assert!(CaptureRequest::from_params(bad.as_object().unwrap()).is_err());
    }
}
