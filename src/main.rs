use anyhow::{Context, Result};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mediajitter::cli::{parse_args, print_help};
use mediajitter::config::Config;
use mediajitter::rtp::receiver::ReceiveSummary;
use mediajitter::rtp::{JitterBuffer, JitterStats, MediaPacket, RtpReceiver};
use mediajitter::simulate::{self, StreamProfile};

/// Pause between synthetic packets (50 packets per 20 ms frame budget)
const SIMULATED_SPACING: Duration = Duration::from_micros(400);

/// What the consumer side saw
#[derive(Debug, Default, Serialize)]
struct ConsumerReport {
    delivered: u64,
    lost: u64,
    payload_bytes: u64,
}

impl ConsumerReport {
    fn record(&mut self, packet: &MediaPacket, loss: u64) {
        self.delivered += 1;
        self.lost += loss;
        self.payload_bytes += packet.payload.len() as u64;
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    receive: Option<ReceiveSummary>,
    consumer: ConsumerReport,
    buffer: JitterStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mediajitter=info".parse()?),
        )
        .init();

    info!("mediajitter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  RTP port: {}", config.rtp_port);
    info!(
        "  Jitter buffer: max_wait={}ms blocking={} fifo={}",
        config.jitter_max_wait_ms, config.jitter_blocking, config.jitter_fifo
    );
    info!("  Listen duration: {}s", config.listen_duration_secs);

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let json = args.json || config.stats_json;

    if let Some(count) = args.simulate {
        let jitter = config.jitter();
        let seed = args.seed;
        let report = tokio::task::spawn_blocking(move || run_simulation(jitter, count, seed))
            .await
            .context("Simulation task failed")?;
        return print_report(&report, json);
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let buffer = JitterBuffer::new(config.jitter());
    let mut receiver = RtpReceiver::bind(config.rtp_port, buffer.clone()).await?;
    info!("Listening for RTP on port {}", receiver.local_port()?);

    loop {
        let consumer = spawn_consumer(buffer.clone());
        let summary = receiver
            .receive_for_cancellable(config.listen_duration(), shutdown.clone())
            .await?;

        buffer.cancel();
        let mut report = match consumer.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Consumer task failed: {}", e);
                ConsumerReport::default()
            }
        };
        flush(&buffer, &mut report);

        let stopping = summary.cancelled || args.once;
        print_report(
            &RunReport {
                receive: Some(summary),
                consumer: report,
                buffer: buffer.stats(),
            },
            json,
        )?;

        if stopping {
            break;
        }
        buffer.reset(true);
    }

    Ok(())
}

/// Drain `buffer` on a blocking thread until it is canceled
fn spawn_consumer(buffer: JitterBuffer<MediaPacket>) -> tokio::task::JoinHandle<ConsumerReport> {
    tokio::task::spawn_blocking(move || consume(&buffer))
}

fn consume(buffer: &JitterBuffer<MediaPacket>) -> ConsumerReport {
    let mut report = ConsumerReport::default();
    loop {
        match buffer.wait(true) {
            Some(packet) => report.record(&packet, buffer.loss()),
            None if buffer.is_canceled() => break,
            // Non-blocking buffer with nothing deliverable yet
            None => thread::sleep(Duration::from_millis(5)),
        }
    }
    report
}

/// Deliver whatever is still queued, skipping gaps
fn flush(buffer: &JitterBuffer<MediaPacket>, report: &mut ConsumerReport) {
    buffer.reset(false);
    while !buffer.is_empty() {
        buffer.hurry_up();
        if let Some(packet) = buffer.wait(false) {
            report.record(&packet, buffer.loss());
        }
    }
}

fn run_simulation(jitter: mediajitter::rtp::JitterConfig, count: usize, seed: u64) -> RunReport {
    let profile = StreamProfile::with_count(count);
    let stream = simulate::generate(&profile, seed);
    info!(
        "Simulating {} packets ({} arrivals, seed {})",
        count,
        stream.len(),
        seed
    );

    let buffer = JitterBuffer::new(jitter);
    let mut report = thread::scope(|scope| {
        let consumer = scope.spawn(|| consume(&buffer));
        for packet in stream {
            buffer.add(packet);
            thread::sleep(SIMULATED_SPACING);
        }
        buffer.cancel();
        consumer.join().unwrap_or_else(|_| {
            warn!("Consumer thread panicked");
            ConsumerReport::default()
        })
    });
    flush(&buffer, &mut report);

    RunReport {
        receive: None,
        consumer: report,
        buffer: buffer.stats(),
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(receive) = &report.receive {
        info!(
            "Received {} datagrams ({} admitted, {} dropped, {} malformed)",
            receive.datagrams, receive.admitted, receive.dropped, receive.malformed
        );
    }
    info!(
        "Delivered {} packets ({} bytes), {} lost",
        report.consumer.delivered, report.consumer.payload_bytes, report.consumer.lost
    );
    let stats = &report.buffer;
    info!(
        "Buffer: duplicates={} stale={} severe_reorders={} resyncs={} timeouts={}",
        stats.duplicates, stats.stale_dropped, stats.severe_reorders, stats.resyncs, stats.timeouts
    );
    Ok(())
}
