#![doc = include_str!("../README.md")]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod metrics;

/// A short-hand way to access one of the metrics in `xlat64_metrics::metrics`
#[macro_export]
macro_rules! metric {
    // Accept a name and multiple labels
    ($metric_name: ident, $($label_name: ident),+) => {
        $crate::metrics::$metric_name.with_label_values(&[$($crate::metrics::label_values::$label_name),+])
    };
    // Accept a bare name for unlabeled metrics
    ($metric_name: ident) => {
        $crate::metrics::$metric_name
    };
}

/// Render every registered metric in the Prometheus text exposition format
#[must_use]
pub fn render() -> String {
    use prometheus::Encoder;

    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(error) = prometheus::TextEncoder::new().encode(&metric_families, &mut buffer) {
        log::warn!("Failed to encode metrics: {}", error);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
