use lazy_static::lazy_static;

pub mod label_values {
    /// IPv4 protocol
    pub const PROTOCOL_IPV4: &str = "ipv4";
    /// IPv6 protocol
    pub const PROTOCOL_IPV6: &str = "ipv6";
    /// ICMP protocol
    pub const PROTOCOL_ICMP: &str = "icmp";
    /// TCP protocol
    pub const PROTOCOL_TCP: &str = "tcp";
    /// UDP protocol
    pub const PROTOCOL_UDP: &str = "udp";

    /// Dropped status
    pub const STATUS_DROPPED: &str = "dropped";
    /// Translated status
    pub const STATUS_TRANSLATED: &str = "translated";
    /// Looped back through the translator
    pub const STATUS_HAIRPINNED: &str = "hairpinned";
    /// Not ours, handed back to the host untouched
    pub const STATUS_ACCEPTED: &str = "accepted";
}

lazy_static! {
    /// Counter for the number of packets processed
    pub static ref PACKET_COUNTER: prometheus::IntCounterVec = prometheus::register_int_counter_vec!(
        "xlat64_packets",
        "Number of packets processed",
        &["protocol", "status"]
    ).unwrap();

    /// Counter for the number of times pool4 had nothing left to hand out
    pub static ref ALLOCATION_EXHAUSTED: prometheus::IntCounterVec = prometheus::register_int_counter_vec!(
        "xlat64_allocation_exhausted",
        "Number of packets dropped because no IPv4 transport address was free",
        &["protocol"]
    ).unwrap();

    /// Number of live sessions as of the last sweep
    pub static ref SESSIONS: prometheus::IntGauge = prometheus::register_int_gauge!(
        "xlat64_sessions",
        "Number of live sessions"
    ).unwrap();

    /// Number of live bindings as of the last sweep
    pub static ref BINDINGS: prometheus::IntGauge = prometheus::register_int_gauge!(
        "xlat64_bindings",
        "Number of live bindings"
    ).unwrap();
}
