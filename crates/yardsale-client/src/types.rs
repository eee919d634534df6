//! Wire envelope shared by the sales endpoints.
//!
//! Every response is tagged with `ok`:
//!
//! ```json
//! { "ok": true,  "data": [...], "dateWindow": {...}, "degraded": false, "count": 120 }
//! { "ok": false, "error": "message" }
//! ```
//!
//! Anything else is malformed. Individual rows that fail to decode (e.g. a
//! listing without coordinates) are skipped rather than failing the page.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use yardsale_core::{DateWindow, Marker, Sale, SalesPage};

use crate::error::ClientError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub date_window: Option<DateWindow>,
    #[serde(default)]
    pub degraded: Option<bool>,
    #[serde(default)]
    pub count: Option<u64>,
}

impl Envelope {
    /// Validate a `/sales` response.
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] for `ok: false`, [`ClientError::Envelope`] for
    /// any other shape violation.
    pub fn into_sales_page(self, context: &str) -> Result<SalesPage, ClientError> {
        let date_window = self.date_window;
        let degraded = self.degraded.unwrap_or(false);
        let count = self.count;
        let sales = self.into_rows::<Sale>(context)?;
        Ok(SalesPage {
            sales,
            date_window,
            degraded,
            count,
        })
    }

    /// Validate a `/sales/markers` response.
    ///
    /// # Errors
    ///
    /// Same as [`Envelope::into_sales_page`].
    pub fn into_markers(self, context: &str) -> Result<Vec<Marker>, ClientError> {
        self.into_rows(context)
    }

    fn into_rows<T: DeserializeOwned>(self, context: &str) -> Result<Vec<T>, ClientError> {
        match self.ok {
            None => Err(envelope_error(context, "missing `ok` flag")),
            Some(false) => Err(ClientError::Api(error_message(self.error.as_ref()))),
            Some(true) => {
                let Some(data) = self.data else {
                    return Err(envelope_error(context, "`ok: true` without `data`"));
                };
                let serde_json::Value::Array(rows) = data else {
                    return Err(envelope_error(context, "`data` is not an array"));
                };
                let total = rows.len();
                let parsed: Vec<T> = rows
                    .into_iter()
                    .filter_map(|row| match serde_json::from_value(row) {
                        Ok(item) => Some(item),
                        Err(e) => {
                            tracing::warn!(%context, error = %e, "skipping undecodable row");
                            None
                        }
                    })
                    .collect();
                if parsed.len() < total {
                    tracing::debug!(%context, total, kept = parsed.len(), "rows dropped");
                }
                Ok(parsed)
            }
        }
    }
}

fn envelope_error(context: &str, reason: &str) -> ClientError {
    ClientError::Envelope {
        context: context.to_owned(),
        reason: reason.to_owned(),
    }
}

/// `error` may be a bare string or an object carrying `message`.
fn error_message(error: Option<&serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| v.to_string(), str::to_owned),
        None => "unknown error".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn parse(value: &serde_json::Value) -> Envelope {
        serde_json::from_value(value.clone()).unwrap()
    }

    #[test]
    fn ok_envelope_carries_page_metadata() {
        let env = parse(&json!({
            "ok": true,
            "data": [{"id": "s1", "title": "Moving sale", "lat": 38.25, "lng": -85.75}],
            "dateWindow": {"from": "2026-10-17", "to": "2026-10-18"},
            "degraded": true,
            "count": 41
        }));
        let page = env.into_sales_page("sales").unwrap();
        assert_eq!(page.sales.len(), 1);
        assert!(page.degraded);
        assert_eq!(page.count, Some(41));
        assert_eq!(
            page.date_window.map(|w| w.from),
            NaiveDate::from_ymd_opt(2026, 10, 17)
        );
    }

    #[test]
    fn ok_false_is_an_api_error() {
        let err = parse(&json!({"ok": false, "error": "bad bbox"}))
            .into_markers("markers")
            .unwrap_err();
        assert!(matches!(err, ClientError::Api(ref m) if m == "bad bbox"));

        let err = parse(&json!({"ok": false, "error": {"message": "rate limited"}}))
            .into_markers("markers")
            .unwrap_err();
        assert!(matches!(err, ClientError::Api(ref m) if m == "rate limited"));
    }

    #[test]
    fn shape_violations_are_envelope_errors() {
        for body in [
            json!({"data": []}),
            json!({"ok": true}),
            json!({"ok": true, "data": {"id": "s1"}}),
        ] {
            let err = parse(&body).into_sales_page("sales").unwrap_err();
            assert!(matches!(err, ClientError::Envelope { .. }), "{body}");
        }
    }

    #[test]
    fn rows_without_coordinates_are_skipped() {
        let markers = parse(&json!({
            "ok": true,
            "data": [
                {"id": "a", "title": "A", "lat": 1.0, "lng": 2.0},
                {"id": "b", "title": "no pin"}
            ]
        }))
        .into_markers("markers")
        .unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, "a");
    }
}
