//! JSON line I/O for the CLI
//!
//! - Input: one JSON record per stdin line, UTF-8
//! - Output: one JSON object per stdout line

use std::io::{self, BufRead, Write};

use serde_json::Value;

use super::errors::CliResult;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::pipeline::RecordSender;

/// Forward every non-blank line of `input` to the pipeline. Returns the
/// number of records submitted. Blocking; run off the async executor.
///
/// Lines that are not UTF-8 are logged, counted as unparseable and
/// skipped. Only read failures end the stream.
pub fn forward_records<R: BufRead>(
    mut input: R,
    records: &RecordSender,
    metrics: &MetricsRegistry,
) -> CliResult<u64> {
    let mut submitted = 0;
    let mut line_number = 0u64;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => line,
            Err(e) => {
                metrics.increment_records_received();
                metrics.increment_records_unparseable();
                log_event_with_fields(
                    Event::RecordParseFailed,
                    &[
                        ("error", &e.utf8_error().to_string()),
                        ("line", &line_number.to_string()),
                    ],
                );
                continue;
            }
        };
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        records.submit(line)?;
        submitted += 1;
    }
    Ok(submitted)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_value(&response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_value(&response)
}

/// Write one JSON value as a line on stdout
pub fn write_value(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Delivery;
    use std::io::Cursor;
    use tokio::sync::mpsc;

    #[test]
    fn test_forward_skips_blank_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = RecordSender::new(tx);
        let input = Cursor::new("{\"a\":1}\n\n   \r\n{\"a\":2}");

        assert_eq!(forward_records(input, &sender, &MetricsRegistry::new()).unwrap(), 2);
        assert_eq!(rx.try_recv().unwrap(), Delivery::new(0, "{\"a\":1}".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Delivery::new(1, "{\"a\":2}".to_string()));
    }

    #[test]
    fn test_forward_skips_non_utf8_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = RecordSender::new(tx);
        let metrics = MetricsRegistry::new();
        let input = Cursor::new(b"{\"a\":1}\n\xff\xfe\n{\"a\":2}\n".to_vec());

        assert_eq!(forward_records(input, &sender, &metrics).unwrap(), 2);
        assert_eq!(rx.try_recv().unwrap(), Delivery::new(0, "{\"a\":1}".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Delivery::new(1, "{\"a\":2}".to_string()));
        assert!(rx.try_recv().is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_unparseable, 1);
        assert_eq!(snapshot.records_received, 1);
    }
}
