//! Glue between the packet path and `xlat64_metrics`

use bib::L4Proto;
use xlat64_metrics::metrics::{self, label_values};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Status {
    Translated,
    Dropped,
    Hairpinned,
    Accepted,
}

fn protocol_label(l4: L4Proto) -> &'static str {
    match l4 {
        L4Proto::Tcp => label_values::PROTOCOL_TCP,
        L4Proto::Udp => label_values::PROTOCOL_UDP,
        L4Proto::Icmp => label_values::PROTOCOL_ICMP,
    }
}

/// Count one packet of `l4` ending up with `status`
pub(crate) fn packet(l4: L4Proto, status: Status) {
    let status = match status {
        Status::Translated => label_values::STATUS_TRANSLATED,
        Status::Dropped => label_values::STATUS_DROPPED,
        Status::Hairpinned => label_values::STATUS_HAIRPINNED,
        Status::Accepted => label_values::STATUS_ACCEPTED,
    };
    metrics::PACKET_COUNTER
        .with_label_values(&[protocol_label(l4), status])
        .inc();
}

pub(crate) fn allocation_exhausted(l4: L4Proto) {
    metrics::ALLOCATION_EXHAUSTED
        .with_label_values(&[protocol_label(l4)])
        .inc();
}

/// Publish the current table sizes
pub(crate) fn tables(sessions: usize, bindings: usize) {
    xlat64_metrics::metric!(SESSIONS).set(i64::try_from(sessions).unwrap_or(i64::MAX));
    xlat64_metrics::metric!(BINDINGS).set(i64::try_from(bindings).unwrap_or(i64::MAX));
}
