//! Feeding hex-encoded packets through a translator

use std::{
    io::{self, BufRead, Write},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use xlat64::{packet::Packet, send::PacketSender, Halt, Step, Verdict, Xlator};

/// Writes translated packets to STDOUT, one hex string per line
#[derive(Debug, Default)]
pub struct HexSender;

impl PacketSender for HexSender {
    fn send(&self, original: &Packet, out: Packet) -> Step<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", hex::encode(out.bytes())).map_err(|error| {
            log::error!("Failed to write translation of {}: {}", original.tuple(), error);
            Halt::Drop
        })
    }
}

/// Tally of what happened to the replayed packets
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    pub translated: u64,
    pub accepted: u64,
    pub dropped: u64,
    /// Lines that were not valid hex
    pub malformed: u64,
}

/// Push every line of `input` through `x` using `workers` threads, sweeping every `sweep_interval`
pub fn replay<R>(x: &Xlator, input: R, workers: usize, sweep_interval: Duration) -> ReplayStats
where
    R: BufRead + Send,
{
    let lines = Mutex::new(input.lines().enumerate());
    let stats = Mutex::new(ReplayStats::default());
    let (stop, stopped) = mpsc::channel::<()>();

    thread::scope(|scope| {
        scope.spawn(move || loop {
            match stopped.recv_timeout(sweep_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let swept = x.sweep();
                    log::debug!(
                        "Swept {} sessions and {} bindings",
                        swept.sessions,
                        swept.bindings
                    );
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| scope.spawn(|| worker(x, &lines, &stats)))
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("A replay worker panicked");
            }
        }
        drop(stop);
    });

    stats.into_inner()
}

fn worker<I>(x: &Xlator, lines: &Mutex<I>, stats: &Mutex<ReplayStats>)
where
    I: Iterator<Item = (usize, io::Result<String>)>,
{
    loop {
        let Some((number, line)) = lines.lock().next() else {
            break;
        };
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                log::error!("Failed to read input: {}", error);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bytes = match hex::decode(line) {
            Ok(bytes) => bytes,
            Err(error) => {
                log::warn!("Line {} is not a hex-encoded packet: {}", number + 1, error);
                stats.lock().malformed += 1;
                continue;
            }
        };

        let verdict = x.process(bytes);
        log::debug!("Line {}: {:?}", number + 1, verdict);
        let mut stats = stats.lock();
        match verdict {
            Verdict::Continue => stats.translated += 1,
            Verdict::Accept => stats.accepted += 1,
            Verdict::Drop => stats.dropped += 1,
        }
    }
}
