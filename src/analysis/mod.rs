//! Periodic natural-language summary of the latest readings.
//!
//! At most one completion call is outstanding at a time and calls start at
//! least `interval` apart. The outcome, or a fixed fallback sentence, goes
//! out to every session as an `ai_response` frame.

use crate::config::AnalysisConfig;
use crate::gateway::fanout::Broadcaster;
use crate::gateway::protocol::OutboundFrame;
use crate::providers::{ModelProvider, ProviderMessage, ProviderRequest};
use crate::telemetry::SensorSnapshot;

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are an industrial environmental monitoring expert. \
Analyze sensor data from a factory/plant environment. Provide professional, technical \
insights in 2-3 sentences. Focus on: air quality status, potential health/safety \
concerns, compliance with industrial standards, and actionable recommendations. \
Be formal and precise.";

/// Sent when the service answers with an empty completion.
pub const EMPTY_COMPLETION_TEXT: &str = "AI analysis unavailable";

/// Chat messages describing one snapshot.
pub fn build_prompt(snapshot: &SensorSnapshot) -> Vec<ProviderMessage> {
    let readings = format!(
        "Industrial sensor readings: VOC={}ppb, eCO2={}ppm, PM2.5={}µg/m³, PM10={}µg/m³, \
         Temperature={}°C, Humidity={}%, Atmospheric Pressure={}hPa, Altitude={}m. \
         Provide analysis and recommendations for factory operations.",
        snapshot.voc,
        snapshot.eco2,
        snapshot.pm25,
        snapshot.pm10,
        snapshot.temperature,
        snapshot.humidity,
        snapshot.pressure,
        snapshot.altitude.round(),
    );
    vec![
        ProviderMessage::system(SYSTEM_PROMPT),
        ProviderMessage::user(readings),
    ]
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Clears the in-flight flag when dropped, however the call task ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AnalysisScheduler {
    provider: Option<Arc<dyn ModelProvider>>,
    fanout: Broadcaster,
    config: AnalysisConfig,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    last_started: Mutex<Option<Instant>>,
    count: AtomicU64,
}

impl AnalysisScheduler {
    pub fn new(
        config: AnalysisConfig,
        provider: Option<Arc<dyn ModelProvider>>,
        fanout: Broadcaster,
    ) -> Self {
        Self {
            provider,
            fanout,
            interval: Duration::from_secs(config.interval_secs),
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_started: Mutex::new(None),
            count: AtomicU64::new(0),
        }
    }

    /// Invocations started so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a summary of `snapshot` if the gate allows it. Returns the
    /// spawned call task, or `None` when gated.
    pub fn maybe_trigger(&self, snapshot: &SensorSnapshot) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }

        let number = {
            let mut last_started = self.last_started.lock();
            if self.in_flight.load(Ordering::Acquire) {
                debug!("Analysis skipped: call already outstanding");
                return None;
            }
            let now = Instant::now();
            if let Some(last) = *last_started {
                if now.saturating_duration_since(last) < self.interval {
                    return None;
                }
            }
            *last_started = Some(now);
            self.in_flight.store(true, Ordering::Release);
            self.count.fetch_add(1, Ordering::AcqRel) + 1
        };

        let guard = InFlightGuard(self.in_flight.clone());
        let provider = self.provider.clone();
        let fanout = self.fanout.clone();
        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages: build_prompt(snapshot),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };
        let max_chars = self.config.max_chars;

        info!("Analysis #{} started", number);
        Some(tokio::spawn(async move {
            let frame = match provider {
                Some(provider) => run_call(provider, request, max_chars, number).await,
                None => {
                    warn!("Analysis #{}: no provider configured, sending fallback", number);
                    OutboundFrame::analysis_fallback()
                }
            };
            drop(guard);
            let sent = fanout.broadcast(&frame);
            debug!("Analysis #{} delivered to {} client(s)", number, sent);
        }))
    }
}

async fn run_call(
    provider: Arc<dyn ModelProvider>,
    request: ProviderRequest,
    max_chars: usize,
    number: u64,
) -> OutboundFrame {
    match AssertUnwindSafe(provider.chat(request)).catch_unwind().await {
        Ok(Ok(response)) => {
            let text = response.content_text();
            let text = text.trim();
            let text = if text.is_empty() {
                EMPTY_COMPLETION_TEXT.to_string()
            } else {
                truncate_chars(text, max_chars)
            };
            info!("Analysis #{} completed ({} chars)", number, text.chars().count());
            OutboundFrame::analysis(text, number)
        }
        Ok(Err(e)) => {
            warn!("Analysis #{} failed: {:#}", number, e);
            OutboundFrame::analysis_fallback()
        }
        Err(_) => {
            warn!("Analysis #{} panicked", number);
            OutboundFrame::analysis_fallback()
        }
    }
}
