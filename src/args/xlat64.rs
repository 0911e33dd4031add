use std::path::PathBuf;

use ipnet::{Ipv4Net, Ipv6Net};
use xlat64::{
    admin::PoolKind,
    config::{Mode, XlatorConfig},
    rfc6052::parse_network_specific_prefix,
    L4Proto,
};

use super::ProfilerArgs;

#[derive(clap::Parser)]
#[clap(author, version, about = "Stateful NAT64 session core", long_about = None)]
pub struct Args {
    /// Path to a config file to read
    #[clap(short = 'c', long = "config")]
    config_file: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub profiler_args: ProfilerArgs,

    /// Enable verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

/// Settings that take precedence over the config file
#[derive(Debug, clap::Args)]
struct Overrides {
    /// RFC6052 IPv6 translation prefix
    #[clap(long, value_parser = parse_network_specific_prefix)]
    pool6: Option<Ipv6Net>,

    /// IPv4 prefixes to use as pool4 address space, for every protocol
    #[clap(long = "pool4-prefix")]
    pool4_prefixes: Vec<Ipv4Net>,

    /// Run as a stateless translator
    #[clap(long)]
    stateless: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Translate packets read as one hex string per line, writing translations as hex to STDOUT
    Replay {
        /// File to read packets from. Defaults to STDIN
        #[clap(short, long)]
        input: Option<PathBuf>,

        /// Number of worker threads
        #[clap(short, long, default_value = "4")]
        workers: usize,

        /// Seconds between expired session sweeps
        #[clap(long, default_value = "10")]
        sweep_interval: u64,

        /// Print every metric once all packets are processed
        #[clap(long)]
        print_metrics: bool,
    },
    /// Dump the entries of one of the instance's pools as JSON
    Pool {
        #[clap(value_enum)]
        kind: PoolArg,

        /// Pool4 protocol
        #[clap(long, value_enum, default_value = "udp")]
        protocol: ProtocolArg,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PoolArg {
    Pool4,
    Blacklist,
    Pool6791,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ProtocolArg {
    Tcp,
    Udp,
    Icmp,
}

impl PoolArg {
    pub fn kind(self, protocol: ProtocolArg) -> PoolKind {
        match self {
            Self::Pool4 => PoolKind::Pool4(match protocol {
                ProtocolArg::Tcp => L4Proto::Tcp,
                ProtocolArg::Udp => L4Proto::Udp,
                ProtocolArg::Icmp => L4Proto::Icmp,
            }),
            Self::Blacklist => PoolKind::Blacklist,
            Self::Pool6791 => PoolKind::Pool6791,
        }
    }
}

impl Args {
    /// Load the config file (if any) and apply CLI overrides on top of it
    pub fn data(&self) -> Result<XlatorConfig, Box<dyn std::error::Error>> {
        let mut config = match self.config_file {
            Some(ref path) => {
                let file = std::fs::File::open(path).map_err(|error| {
                    log::error!("Could not open config file {}: {}", path.display(), error);
                    error
                })?;
                serde_json::from_reader(file)?
            }
            None => XlatorConfig::default(),
        };

        if let Some(pool6) = self.overrides.pool6 {
            config.pool6 = pool6;
        }
        if !self.overrides.pool4_prefixes.is_empty() {
            // Configured port ranges survive, only the address space is replaced
            for protocol in [
                &mut config.pool4.tcp,
                &mut config.pool4.udp,
                &mut config.pool4.icmp,
            ] {
                protocol.prefixes = self.overrides.pool4_prefixes.clone();
            }
        }
        if self.overrides.stateless {
            config.mode = Mode::Stateless;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use xlat64::config::PortRange;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("xlat64").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_config_file() {
        let args = parse(&["replay"]);
        let config = args.data().unwrap();
        assert_eq!(config, XlatorConfig::default());
        assert!(matches!(
            args.command,
            Command::Replay {
                workers: 4,
                sweep_interval: 10,
                print_metrics: false,
                ..
            }
        ));
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let path = std::env::temp_dir().join(format!("xlat64-args-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "pool6": "2001:db8:64::/96",
                "pool4": {{
                    "tcp": {{ "prefixes": ["192.0.2.0/24"], "ports": {{ "first": 1024, "last": 2047 }} }},
                    "max_iterations": 64
                }}
            }}"#
        )
        .unwrap();
        drop(file);

        let config = parse(&[
            "-c",
            path.to_str().unwrap(),
            "--pool4-prefix",
            "198.51.100.0/24",
            "--stateless",
            "pool",
            "blacklist",
        ])
        .data()
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.pool6, "2001:db8:64::/96".parse().unwrap());
        assert_eq!(config.mode, Mode::Stateless);
        assert_eq!(config.pool4.max_iterations, Some(64));
        assert_eq!(config.pool4.ports(L4Proto::Tcp), PortRange::new(1024, 2047));
        for l4 in L4Proto::ALL {
            assert_eq!(
                config.pool4.protocol(l4).prefixes,
                vec!["198.51.100.0/24".parse::<Ipv4Net>().unwrap()]
            );
        }
    }

    #[test]
    fn test_pool6_is_validated() {
        assert!(Args::try_parse_from(["xlat64", "--pool6", "64:ff9b::/80", "replay"]).is_err());
        let config = parse(&["--pool6", "2001:db8::/32", "replay"]).data().unwrap();
        assert_eq!(config.pool6, "2001:db8::/32".parse().unwrap());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(parse(&["-c", "/nonexistent/xlat64.json", "replay"])
            .data()
            .is_err());
    }

    #[test]
    fn test_pool_kind() {
        assert_eq!(
            PoolArg::Pool4.kind(ProtocolArg::Icmp),
            PoolKind::Pool4(L4Proto::Icmp)
        );
        assert_eq!(PoolArg::Blacklist.kind(ProtocolArg::Tcp), PoolKind::Blacklist);
        let args = parse(&["pool", "pool4", "--protocol", "tcp"]);
        match args.command {
            Command::Pool { kind, protocol } => {
                assert_eq!(kind.kind(protocol), PoolKind::Pool4(L4Proto::Tcp));
            }
            Command::Replay { .. } => panic!("expected the pool subcommand"),
        }
    }
}
