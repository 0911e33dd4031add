//! The translator instance and its packet entry points

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash, Hasher},
    net::{SocketAddrV4, SocketAddrV6},
    sync::Arc,
    time::Instant,
};

use addrpool::Pool;
use bib::{BindingTable, L3Proto, SessionTable};
use rustc_hash::FxHasher;

use crate::{
    config::{ConfigError, Mode, XlatorConfig},
    packet::Packet,
    pool4::Pool4,
    rfc6052::Pool6,
    send::PacketSender,
    stateful::{compute_outgoing_tuple, filtering_and_updating, handling_hairpinning, is_hairpin},
    xlat::PacketTranslator,
    Halt, Step, Verdict,
};

/// What a sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sessions: usize,
    pub bindings: usize,
}

/// A single NAT64 translator instance.
///
/// Everything the packet path needs hangs off this struct. It is `Send + Sync` and meant to be
/// shared between worker threads behind an `Arc`.
pub struct Xlator {
    config: XlatorConfig,
    pool6: Pool6,
    pool4: Pool4,
    blacklist: Pool,
    pool6791: Pool,
    bindings: BindingTable,
    sessions: SessionTable,
    translator: Arc<dyn PacketTranslator>,
    sender: Arc<dyn PacketSender>,
    /// Keeps allocation offsets unpredictable from the outside
    secret: u64,
}

impl Xlator {
    /// Construct a new translator instance
    pub fn new(
        config: XlatorConfig,
        translator: Arc<dyn PacketTranslator>,
        sender: Arc<dyn PacketSender>,
    ) -> Result<Self, ConfigError> {
        let pool6 = config.validate()?;
        let pool4 = Pool4::new(&config.pool4);

        let bindings = BindingTable::new();
        for binding in &config.static_bindings {
            if !pool4.contains_endpoint(binding.protocol, binding.ipv4) {
                return Err(ConfigError::StaticBindingOutsidePool4(binding.ipv4));
            }
            bindings.insert_static(binding.protocol, binding.ipv6, binding.ipv4)?;
        }

        log::info!(
            "Starting {:?} translator with pool6 {} and {} static bindings",
            config.mode,
            pool6.prefix(),
            bindings.len()
        );
        Ok(Self {
            pool6,
            pool4,
            blacklist: Pool::from_prefixes(config.blacklist.iter().copied()),
            pool6791: Pool::from_prefixes(config.pool6791.iter().copied()),
            bindings,
            sessions: SessionTable::new(),
            translator,
            sender,
            secret: RandomState::new().hash_one(0u64),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &XlatorConfig {
        &self.config
    }

    #[must_use]
    pub fn pool6(&self) -> &Pool6 {
        &self.pool6
    }

    #[must_use]
    pub fn pool4(&self) -> &Pool4 {
        &self.pool4
    }

    #[must_use]
    pub fn blacklist(&self) -> &Pool {
        &self.blacklist
    }

    #[must_use]
    pub fn pool6791(&self) -> &Pool {
        &self.pool6791
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    #[must_use]
    pub fn translator(&self) -> &dyn PacketTranslator {
        self.translator.as_ref()
    }

    #[must_use]
    pub fn sender(&self) -> &dyn PacketSender {
        self.sender.as_ref()
    }

    /// Where in pool4 an allocation for `v6` talking to `remote` starts looking
    #[must_use]
    pub fn allocation_offset(&self, v6: SocketAddrV6, remote: SocketAddrV4) -> u64 {
        let mut hasher = FxHasher::default();
        self.secret.hash(&mut hasher);
        v6.hash(&mut hasher);
        remote.ip().hash(&mut hasher);
        hasher.finish()
    }

    /// Handle a raw IP packet of either version
    #[must_use]
    #[profiling::function]
    pub fn process(&self, bytes: Vec<u8>) -> Verdict {
        match bytes.first().map(|byte| byte >> 4) {
            None => Verdict::Drop,
            Some(4) => self.core_4to6(bytes),
            Some(6) => self.core_6to4(bytes),
            Some(version) => {
                log::trace!("Ignoring IPv{} packet", version);
                Verdict::Accept
            }
        }
    }

    /// Handle a packet that arrived from the IPv6 network
    #[must_use]
    pub fn core_6to4(&self, bytes: Vec<u8>) -> Verdict {
        self.core(bytes, L3Proto::Ipv6)
    }

    /// Handle a packet that arrived from the IPv4 network
    #[must_use]
    pub fn core_4to6(&self, bytes: Vec<u8>) -> Verdict {
        self.core(bytes, L3Proto::Ipv4)
    }

    fn core(&self, bytes: Vec<u8>, family: L3Proto) -> Verdict {
        if self.config.mode == Mode::Stateless {
            return Verdict::Accept;
        }
        let packet = match parse(bytes, family) {
            Ok(packet) => packet,
            Err(halt) => return halt.into(),
        };

        let verdict = Verdict::from(self.translate_packet(&packet));
        log::trace!("{} -> {:?}", packet.tuple(), verdict);

        #[cfg(feature = "metrics")]
        crate::metrics::packet(
            packet.l4_proto(),
            match verdict {
                Verdict::Continue => crate::metrics::Status::Translated,
                Verdict::Accept => crate::metrics::Status::Accepted,
                Verdict::Drop => crate::metrics::Status::Dropped,
            },
        );
        verdict
    }

    fn translate_packet(&self, packet: &Packet) -> Step<()> {
        let tuple = packet.tuple();
        filtering_and_updating(self, packet, &tuple)?;
        let out_tuple = compute_outgoing_tuple(self, &tuple, packet)?;
        let out = self.translator.translate(&out_tuple, packet)?;

        if is_hairpin(self, &out_tuple) {
            handling_hairpinning(self, &out, &out_tuple)
        } else {
            self.sender.send(packet, out)
        }
    }

    /// Remove expired sessions, then the dynamic bindings no session uses anymore
    #[must_use]
    pub fn sweep(&self) -> SweepStats {
        self.sweep_at(Instant::now())
    }

    /// Like [`Xlator::sweep`], pretending it is `now`
    #[must_use]
    pub fn sweep_at(&self, now: Instant) -> SweepStats {
        let sessions = self.sessions.prune(now);
        let bindings = self.bindings.prune(now, &self.sessions.bound_endpoints());
        if sessions > 0 || bindings > 0 {
            log::debug!(
                "Swept {} sessions and {} bindings. {} sessions and {} bindings left",
                sessions,
                bindings,
                self.sessions.len(),
                self.bindings.len()
            );
        }

        #[cfg(feature = "metrics")]
        crate::metrics::tables(self.sessions.len(), self.bindings.len());
        SweepStats { sessions, bindings }
    }
}

/// Parse a packet that is expected to be of `family`
fn parse(bytes: Vec<u8>, family: L3Proto) -> Step<Packet> {
    let packet = Packet::parse(bytes).map_err(|error| {
        if error.is_unsupported() {
            log::trace!("Passing on packet: {}", error);
            Halt::Accept
        } else {
            log::warn!("Dropping malformed packet: {}", error);
            Halt::Drop
        }
    })?;
    if packet.l3_proto() != family {
        log::warn!("Expected an {} packet, got {}", family, packet.tuple());
        return Err(Halt::Drop);
    }
    Ok(packet)
}
