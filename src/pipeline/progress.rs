use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::trace;

/// Download progress of the extraction service, one per progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "progress")]
pub struct ProgressEvent {
    pub percent: Option<f64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed: String,
    pub eta: String,
}

impl ProgressEvent {
    /// Build an event out of the raw values reported by the service.
    ///
    /// The percent string wins when it parses. Otherwise the percentage is
    /// computed from the byte counts, and only from an exact total.
    pub fn new(
        percent_str: Option<&str>,
        downloaded_bytes: Option<u64>,
        total_bytes: Option<u64>,
        speed: Option<&str>,
        eta: Option<&str>,
    ) -> Self {
        let percent = percent_str
            .and_then(|s| s.trim().trim_end_matches('%').trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .or_else(|| match (downloaded_bytes, total_bytes) {
                (Some(done), Some(total)) if total > 0 => Some(done as f64 / total as f64 * 100.0),
                _ => None,
            });

        let or_na = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("N/A")
                .to_owned()
        };

        Self {
            percent,
            downloaded_bytes,
            total_bytes,
            speed: or_na(speed),
            eta: or_na(eta),
        }
    }
}

/// Write side of the progress channel.
///
/// Sending never blocks: when the consumer lags behind and the channel is
/// full, the event is dropped.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Option<Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// A bounded channel and the sink writing into it.
    pub fn bounded(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink nobody listens to.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!("Progress consumer lagging, dropped {event:?}")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
