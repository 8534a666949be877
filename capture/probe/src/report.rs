//! Plain-text and JSON rendering of captured records

use std::fmt::Write;

use capture_core::{export_json, CaptureRecord};

/// What to include in the report
#[derive(Clone, Debug)]
pub struct ReportOptions {
    /// Emit a JSON array instead of a table
    pub json: bool,
    /// Append a curl command under each row
    pub curl: bool,
    /// Append rendered request and response bodies under each row
    pub bodies: bool,
    /// Character ceiling for rendered bodies
    pub body_preview_chars: usize,
}

/// Render records, newest first
pub fn render(records: &[CaptureRecord], options: &ReportOptions) -> Result<String, serde_json::Error> {
    if options.json {
        let mut out = export_json(records)?;
        out.push('\n');
        return Ok(out);
    }

    if records.is_empty() {
        return Ok("No requests captured.\n".to_string());
    }

    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(out, "{:<8} {:<7} {:>9}  URL", "STATUS", "METHOD", "TIME");
    for record in records {
        let request = record.request();
        let _ = writeln!(
            out,
            "{:<8} {:<7} {:>9}  {}",
            record.display_status(),
            request.method,
            record.duration_text(),
            request.url
        );

        if let Some(error) = record.error() {
            let _ = writeln!(out, "  error ({}): {}", error.kind, error.description);
        }
        if options.curl {
            let _ = writeln!(out, "  $ {}", record.to_curl());
        }
        if options.bodies {
            if let Some(body) = record.request_body_text(options.body_preview_chars) {
                let _ = writeln!(out, "  > {}", indent(&body));
            }
            if let Some(body) = record.response_body_text(options.body_preview_chars) {
                let _ = writeln!(out, "  < {}", indent(&body));
            }
        }
    }
    Ok(out)
}

fn indent(text: &str) -> String {
    text.replace('\n', "\n    ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use capture_core::record::HeaderFields;
    use capture_core::{CaptureStore, FailureKind, RecordedError, RequestSnapshot};

    fn options() -> ReportOptions {
        ReportOptions {
            json: false,
            curl: false,
            bodies: false,
            body_preview_chars: 1_000,
        }
    }

    fn sample_records() -> Vec<CaptureRecord> {
        let store = CaptureStore::new(10);
        let ok = store.initiate(RequestSnapshot::new("GET", "https://api.example.com/users"));
        let mut headers = HeaderFields::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        store.complete_with_response(
            ok,
            200,
            headers,
            Some(r#"{"id":7}"#.into()),
            Duration::from_millis(42),
        );

        let failed = store.initiate(RequestSnapshot::new("POST", "https://api.example.com/login"));
        store.complete_with_error(
            failed,
            RecordedError::new(FailureKind::Timeout, "request timed out: 10s"),
            Duration::from_millis(1500),
        );
        store.records()
    }

    #[test]
    fn test_table_rows() {
        let out = render(&sample_records(), &options()).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].starts_with("STATUS"));
        assert!(lines[1].starts_with("Error"));
        assert!(lines[1].contains("POST"));
        assert!(lines[1].contains("1.50 s"));
        assert_eq!(lines[2], "  error (timeout): request timed out: 10s");
        assert!(lines[3].starts_with("200"));
        assert!(lines[3].contains("42 ms"));
        assert!(lines[3].ends_with("https://api.example.com/users"));
    }

    #[test]
    fn test_bodies_and_curl() {
        let out = render(
            &sample_records(),
            &ReportOptions {
                curl: true,
                bodies: true,
                ..options()
            },
        )
        .unwrap();

        assert!(out.contains("  $ curl"));
        assert!(out.contains("  < {\n      \"id\": 7\n    }"));
    }

    #[test]
    fn test_empty_and_json() {
        assert_eq!(render(&[], &options()).unwrap(), "No requests captured.\n");

        let json = render(
            &sample_records(),
            &ReportOptions {
                json: true,
                ..options()
            },
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }
}
