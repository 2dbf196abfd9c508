use crate::{Error, Result};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Per-link exchange counters. Clones share the underlying counters.
#[derive(Clone)]
pub struct LinkMetrics {
    pub requests: IntCounter,
    pub responses: IntCounter,
    pub timeouts: IntCounter,
    pub checksum_failures: IntCounter,
    pub aborts: IntCounter,
    pub resync_bytes: IntCounter,
}

impl LinkMetrics {
    /// Counters that are not registered in any registry.
    pub fn new() -> Result<Self> {
        Ok(Self {
            requests: counter("lift_requests_total", "Total requests sent to the drive")?,
            responses: counter("lift_responses_total", "Total responses accepted from the drive")?,
            timeouts: counter("lift_timeouts_total", "Exchanges that hit the response deadline")?,
            checksum_failures: counter(
                "lift_checksum_failures_total",
                "Serial frames rejected by the LRC check",
            )?,
            aborts: counter("lift_aborts_total", "SDO aborts reported by the drive")?,
            resync_bytes: counter(
                "lift_resync_bytes_total",
                "Bytes discarded while resynchronising the serial stream",
            )?,
        })
    }
}

fn counter(name: &str, help: &str) -> Result<IntCounter> {
    IntCounter::new(name, help).map_err(|e| Error::Config(format!("metrics init error: {e}")))
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub link: LinkMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let link = LinkMetrics::new()?;
        for c in [
            &link.requests,
            &link.responses,
            &link.timeouts,
            &link.checksum_failures,
            &link.aborts,
            &link.resync_bytes,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|e| Error::Config(format!("metrics register error: {e}")))?;
        }
        Ok(Self { registry, link })
    }

    /// Counters to hand to a register channel.
    pub fn link(&self) -> LinkMetrics {
        self.link.clone()
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let hub = MetricsHub::new().unwrap();
        let link = hub.link();
        link.requests.inc();
        link.requests.inc();
        link.resync_bytes.inc_by(3);
        assert_eq!(hub.link.requests.get(), 2);
        let text = hub.encode_text();
        assert!(text.contains("lift_requests_total 2"), "{text}");
        assert!(text.contains("lift_resync_bytes_total 3"), "{text}");
    }

    #[test]
    fn hubs_are_independent() {
        let a = MetricsHub::new().unwrap();
        let b = MetricsHub::new().unwrap();
        a.link.timeouts.inc();
        assert_eq!(b.link.timeouts.get(), 0);
    }
}
