//! In-process stand-in for the downstream aggregation tier
//!
//! Each echo instance prints the data tuples it receives as JSON lines and
//! answers every flush signal with a session-end, after writing everything
//! that arrived before it.

use tokio::sync::broadcast::error::RecvError;

use super::io::write_value;
use crate::observability::Logger;
use crate::pipeline::{DownstreamPort, SessionEndRouter};
use crate::stream::SessionEnd;

/// Totals for one echo instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoSummary {
    pub elements: u64,
    pub session_ends: u64,
}

/// Run until every accumulator instance has stopped
pub async fn run_echo(mut port: DownstreamPort, router: SessionEndRouter) -> EchoSummary {
    let downstream = port.index.to_string();
    let mut summary = EchoSummary::default();
    let mut data_open = true;
    let mut stdout_ok = true;

    loop {
        tokio::select! {
            biased;

            element = port.data.recv(), if data_open => match element {
                Some(element) => {
                    summary.elements += 1;
                    if stdout_ok {
                        if let Err(e) = write_value(&element.to_json()) {
                            stdout_ok = false;
                            Logger::error(
                                "ECHO_WRITE_FAILED",
                                &[("downstream", &downstream), ("error", e.message())],
                            );
                        }
                    }
                }
                None => data_open = false,
            },

            flush = port.flushes.recv() => match flush {
                Ok(signal) => {
                    match router.deliver(SessionEnd::answering(signal, port.index)) {
                        Ok(_) => summary.session_ends += 1,
                        Err(e) => Logger::warn(
                            "ECHO_SESSION_END_FAILED",
                            &[("downstream", &downstream), ("error", &e.to_string())],
                        ),
                    }
                }
                Err(RecvError::Lagged(missed)) => Logger::warn(
                    "ECHO_FLUSH_LAGGED",
                    &[("downstream", &downstream), ("missed", &missed.to_string())],
                ),
                Err(RecvError::Closed) => break,
            },
        }
    }

    summary
}
