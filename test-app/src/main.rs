// hamlink test application -- CLI tool for exercising every hamlink adapter
// against real software, radios, and services.
//
// Usage:
//   hamlink-test-app wsjtx listen --duration 120
//   hamlink-test-app smartsdr --host 192.168.1.100 spot --call K1ABC --freq-khz 14062 --mode CW
//   hamlink-test-app smartsdr --host 192.168.1.100 cw --text "CQ TEST" --wpm 22
//   hamlink-test-app smartsdr --host 192.168.1.100 tune --freq-khz 14074 --mode FT8
//   hamlink-test-app tci --host 127.0.0.1 spot --call K1ABC --freq-khz 14062 --mode CW
//   hamlink-test-app pskreporter poll --app-contact n0call@example.com
//   hamlink-test-app wwff respot --callsign N0CALL --freq-khz 14244 \
//       --activator K1ABC --reference KFF-1234 --mode SSB
//
// Settings not given on the command line come from --config (or
// ./hamlink.toml when present), then from the library defaults.

mod config;
mod morse;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;

use hamlink::pskreporter::PskReporterBuilder;
use hamlink::smartsdr::{SmartSdrAdapter, SmartSdrBuilder};
use hamlink::tci::{TciAdapter, TciBuilder};
use hamlink::wsjtx::WsjtxBuilder;
use hamlink::wwff::{RespotOptions, RespotRequest, WwffRespotter};
use hamlink::{Adapter, AdapterEvent, ConnectionState, Spot, SpotSource, format_freq_mhz};

use config::FileConfig;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// hamlink test application -- drives the radio network adapters from the
/// command line and prints their events.
#[derive(Parser)]
#[command(name = "hamlink-test-app", version, about)]
struct Cli {
    /// TOML configuration file (default: ./hamlink.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `hamlink_flex=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// WSJT-X UDP adapter.
    Wsjtx {
        #[command(subcommand)]
        action: WsjtxAction,
    },

    /// FlexRadio SmartSDR adapter.
    Smartsdr {
        /// Radio IP address or hostname.
        #[arg(long)]
        host: Option<String>,

        /// SmartSDR TCP port.
        #[arg(long)]
        port: Option<u16>,

        #[command(subcommand)]
        action: SmartSdrAction,
    },

    /// TCI WebSocket adapter.
    Tci {
        /// TCI server host.
        #[arg(long)]
        host: Option<String>,

        /// TCI server port.
        #[arg(long)]
        port: Option<u16>,

        #[command(subcommand)]
        action: TciAction,
    },

    /// PSKReporter poller.
    Pskreporter {
        #[command(subcommand)]
        action: PskReporterAction,
    },

    /// WWFF cluster respotter.
    Wwff {
        #[command(subcommand)]
        action: WwffAction,
    },
}

#[derive(Subcommand)]
enum WsjtxAction {
    /// Listen for WSJT-X and print decodes, status, and logged QSOs.
    Listen {
        /// UDP port to bind.
        #[arg(long)]
        port: Option<u16>,

        /// Local address to bind.
        #[arg(long)]
        bind: Option<String>,

        /// Seconds to listen.
        #[arg(long, default_value_t = 60)]
        duration: u64,
    },
}

#[derive(Args, Clone)]
struct SpotArgs {
    /// Spotted callsign.
    #[arg(long)]
    call: String,

    /// Frequency in kHz.
    #[arg(long)]
    freq_khz: f64,

    /// Mode (CW, SSB, FT8, ...).
    #[arg(long, default_value = "CW")]
    mode: String,

    /// Program reference shown on the marker (e.g. US-1234).
    #[arg(long)]
    reference: Option<String>,

    /// Spot source, selects the marker colour.
    #[arg(long, value_enum, default_value = "pota")]
    source: SourceArg,

    /// Seconds to keep the marker before pruning it.
    #[arg(long, default_value_t = 30)]
    hold: u64,
}

#[derive(Subcommand)]
enum SmartSdrAction {
    /// Push one spot marker, hold it, then prune it.
    Spot(SpotArgs),

    /// Key a text message in Morse through the radio's CW keyer path.
    Cw {
        /// Text to send.
        #[arg(long)]
        text: String,

        /// Speed in words per minute.
        #[arg(long, default_value_t = 20)]
        wpm: u8,
    },

    /// Tune a slice.
    Tune {
        /// Frequency in kHz.
        #[arg(long)]
        freq_khz: f64,

        /// Host mode name.
        #[arg(long)]
        mode: Option<String>,

        /// Slice index.
        #[arg(long, default_value_t = 0)]
        slice: u8,
    },
}

#[derive(Subcommand)]
enum TciAction {
    /// Push one spot marker, hold it, then prune it.
    Spot(SpotArgs),

    /// Tune receiver 0.
    Tune {
        /// Frequency in kHz.
        #[arg(long)]
        freq_khz: f64,

        /// Host mode name.
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Subcommand)]
enum PskReporterAction {
    /// Poll the feed and print reception reports.
    Poll {
        /// Mode filter.
        #[arg(long)]
        mode: Option<String>,

        /// Contact string sent with each query.
        #[arg(long)]
        app_contact: Option<String>,

        /// Seconds to keep polling.
        #[arg(long, default_value_t = 900)]
        duration: u64,
    },
}

#[derive(Subcommand)]
enum WwffAction {
    /// Post one spot to the cluster.
    Respot {
        /// Login callsign.
        #[arg(long)]
        callsign: Option<String>,

        /// Frequency in kHz.
        #[arg(long)]
        freq_khz: f64,

        /// Activating station.
        #[arg(long)]
        activator: String,

        /// WWFF reference.
        #[arg(long)]
        reference: String,

        /// Mode.
        #[arg(long)]
        mode: String,

        /// Free-text comment.
        #[arg(long)]
        comment: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Pota,
    Sota,
    Wwff,
    Llota,
    Cluster,
    Rbn,
    Pskreporter,
    Freedv,
}

impl From<SourceArg> for SpotSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Pota => SpotSource::Pota,
            SourceArg::Sota => SpotSource::Sota,
            SourceArg::Wwff => SpotSource::Wwff,
            SourceArg::Llota => SpotSource::Llota,
            SourceArg::Cluster => SpotSource::DxCluster,
            SourceArg::Rbn => SpotSource::Rbn,
            SourceArg::Pskreporter => SpotSource::PskReporter,
            SourceArg::Freedv => SpotSource::FreeDv,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CONNECT_WAIT: Duration = Duration::from_secs(15);

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => tracing_subscriber::EnvFilter::new(l),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn secs(s: Option<u64>) -> Option<Duration> {
    s.map(Duration::from_secs)
}

fn describe_event(event: &AdapterEvent) -> String {
    match event {
        AdapterEvent::Connected { peer, detail } => match detail {
            Some(d) => format!("Connected         {peer} ({d})"),
            None => format!("Connected         {peer}"),
        },
        AdapterEvent::Disconnected { reason } => format!("Disconnected      {reason:?}"),
        AdapterEvent::Reconnecting { attempt, delay } => {
            format!("Reconnecting      attempt {attempt} in {}s", delay.as_secs())
        }
        AdapterEvent::Decode(d) => format!(
            "Decode            {:>4} dB {:>5.1}s {:>5} Hz  {}",
            d.snr, d.delta_time, d.delta_freq, d.message
        ),
        AdapterEvent::Status(s) => format!(
            "Status            {} {} dx={} tx={}",
            format_freq_mhz(s.dial_freq_hz),
            s.mode,
            s.dx_call,
            s.transmitting
        ),
        AdapterEvent::Cleared { window } => format!("Cleared           window {window:?}"),
        AdapterEvent::QsoLogged(q) => format!(
            "QsoLogged         {} {} {} sent {} rcvd {}",
            q.dx_call,
            format_freq_mhz(q.tx_freq_hz),
            q.mode,
            q.report_sent,
            q.report_received
        ),
        AdapterEvent::LoggedAdif(adif) => format!("LoggedAdif        {} bytes", adif.len()),
        AdapterEvent::Reports(reports) => {
            let mut text = format!("Reports           {} report(s)", reports.len());
            for r in reports {
                text.push_str(&format!(
                    "\n    {:<10} {} heard by {:<10} snr {:?}",
                    r.sender_callsign,
                    format_freq_mhz(r.freq_hz),
                    r.receiver_callsign.as_deref().unwrap_or("?"),
                    r.snr
                ));
            }
            text
        }
        AdapterEvent::CommandRejected {
            sequence,
            code,
            message,
        } => format!("CommandRejected   seq {sequence} code 0x{code:08X} {message}"),
        AdapterEvent::Error(e) => format!("Error             {e}"),
    }
}

/// Print adapter events until `duration` elapses or Ctrl-C.
async fn print_events(adapter: &dyn Adapter, duration: Duration) {
    let mut events = adapter.subscribe();
    let deadline = tokio::time::Instant::now() + duration;
    let start = tokio::time::Instant::now();

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            e = events.recv() => e,
        };
        match event {
            Ok(event) => {
                let elapsed = start.elapsed();
                println!(
                    "{:>6}.{:03}s {}",
                    elapsed.as_secs(),
                    elapsed.subsec_millis(),
                    describe_event(&event)
                );
            }
            Err(RecvError::Lagged(n)) => println!("(missed {n} events due to lag)"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn wait_connected(adapter: &dyn Adapter) -> Result<()> {
    let mut state = adapter.state_watch();
    tokio::time::timeout(
        CONNECT_WAIT,
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .with_context(|| format!("{} did not connect within {CONNECT_WAIT:?}", adapter.name()))?
    .context("adapter stopped")?;
    Ok(())
}

fn build_spot(args: &SpotArgs) -> Spot {
    let mut spot = Spot::from_khz(&args.call, args.freq_khz, &args.mode).with_source(args.source.into());
    if let Some(reference) = &args.reference {
        spot = spot.with_reference(reference);
    }
    spot
}

// ---------------------------------------------------------------------------
// WSJT-X
// ---------------------------------------------------------------------------

async fn cmd_wsjtx_listen(
    cfg: &FileConfig,
    port: Option<u16>,
    bind: Option<String>,
    duration: u64,
) -> Result<()> {
    let mut builder = WsjtxBuilder::new();
    if let Some(addr) = bind.or_else(|| cfg.wsjtx.bind_address.clone()) {
        builder = builder.bind_address(&addr);
    }
    if let Some(port) = port.or(cfg.wsjtx.port) {
        builder = builder.port(port);
    }
    if let Some(timeout) = secs(cfg.wsjtx.heartbeat_timeout_secs) {
        builder = builder.heartbeat_timeout(timeout);
    }

    let wsjtx = builder.build().await.context("binding WSJT-X socket")?;
    println!("Listening on {} for {duration}s", wsjtx.local_addr());
    print_events(&wsjtx, Duration::from_secs(duration)).await;
    wsjtx.disconnect().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// SmartSDR
// ---------------------------------------------------------------------------

fn create_smartsdr(cfg: &FileConfig, host: Option<String>, port: Option<u16>) -> Result<SmartSdrAdapter> {
    let section = &cfg.smartsdr;
    let Some(host) = host.or_else(|| section.host.clone()) else {
        bail!("--host is required for smartsdr (or set [smartsdr] host in the config)");
    };
    let mut builder = SmartSdrBuilder::new().host(&host);
    if let Some(port) = port.or(section.port) {
        builder = builder.tcp_port(port);
    }
    if let Some(delay) = secs(section.reconnect_secs) {
        builder = builder.reconnect_delay(delay);
    }
    if let Some(ms) = section.ptt_holdoff_ms {
        builder = builder.ptt_holdoff(Duration::from_millis(ms));
    }
    if let Some(source) = &section.spot_source {
        builder = builder.spot_source(source);
    }
    if let Some(lifetime) = section.spot_lifetime_seconds {
        builder = builder.spot_lifetime_seconds(lifetime);
    }
    Ok(builder.build()?)
}

async fn cmd_smartsdr_spot(sdr: &SmartSdrAdapter, args: &SpotArgs) -> Result<()> {
    let spot = build_spot(args);
    sdr.add_spot(&spot).await;
    sdr.prune_stale_spots().await;
    println!(
        "Spot {} at {} pushed; holding {}s",
        spot.callsign,
        format_freq_mhz(spot.freq_hz),
        args.hold
    );
    print_events(sdr, Duration::from_secs(args.hold)).await;

    let removed = sdr.prune_stale_spots().await;
    println!("Pruned {removed} marker(s)");
    Ok(())
}

async fn cmd_smartsdr_cw(sdr: &SmartSdrAdapter, text: &str, wpm: u8) -> Result<()> {
    let elements = morse::elements(text);
    if elements.is_empty() {
        bail!("nothing to send in {text:?}");
    }
    let dit = Duration::from_millis(morse::dit_ms(wpm));
    sdr.set_cw_speed(wpm).await;
    sdr.cw_ptt_on().await;

    println!("Sending {text:?} at {wpm} WPM ({} elements)", elements.len());
    for element in &elements {
        sdr.cw_key(element.down).await;
        tokio::time::sleep(dit * element.units).await;
    }
    sdr.cw_stop().await;
    println!("Done; PTT released");
    Ok(())
}

async fn cmd_smartsdr_tune(sdr: &SmartSdrAdapter, slice: u8, freq_khz: f64, mode: Option<&str>) -> Result<()> {
    let freq_hz = hamlink::khz_to_hz(freq_khz);
    sdr.tune(slice, freq_hz, mode, None).await;
    println!("Slice {slice} tuned to {}", format_freq_mhz(freq_hz));
    Ok(())
}

// ---------------------------------------------------------------------------
// TCI
// ---------------------------------------------------------------------------

fn create_tci(cfg: &FileConfig, host: Option<String>, port: Option<u16>) -> Result<TciAdapter> {
    let section = &cfg.tci;
    let mut builder = TciBuilder::new();
    if let Some(host) = host.or_else(|| section.host.clone()) {
        builder = builder.host(&host);
    }
    if let Some(port) = port.or(section.port) {
        builder = builder.port(port);
    }
    if let Some(delay) = secs(section.reconnect_secs) {
        builder = builder.reconnect_delay(delay);
    }
    Ok(builder.build()?)
}

async fn cmd_tci_spot(tci: &TciAdapter, args: &SpotArgs) -> Result<()> {
    let spot = build_spot(args);
    tci.add_spot(&spot).await;
    tci.prune_stale_spots().await;
    println!("Spot {} pushed; holding {}s", spot.callsign, args.hold);
    print_events(tci, Duration::from_secs(args.hold)).await;

    let removed = tci.prune_stale_spots().await;
    println!("Pruned {removed} marker(s)");
    Ok(())
}

// ---------------------------------------------------------------------------
// PSKReporter and WWFF
// ---------------------------------------------------------------------------

async fn cmd_pskreporter_poll(
    cfg: &FileConfig,
    mode: Option<String>,
    app_contact: Option<String>,
    duration: u64,
) -> Result<()> {
    let section = &cfg.pskreporter;
    let mut builder = PskReporterBuilder::new();
    if let Some(mode) = mode.or_else(|| section.mode.clone()) {
        builder = builder.mode(&mode);
    }
    if let Some(contact) = app_contact.or_else(|| section.app_contact.clone()) {
        builder = builder.app_contact(&contact);
    }
    if let Some(interval) = secs(section.poll_interval_secs) {
        builder = builder.poll_interval(interval);
    }
    if let Some(backoff) = secs(section.backoff_secs) {
        builder = builder.backoff_interval(backoff);
    }

    let psk = builder.build()?;
    println!("Polling PSKReporter for {duration}s");
    print_events(&psk, Duration::from_secs(duration)).await;
    psk.disconnect().await;
    Ok(())
}

async fn cmd_wwff_respot(cfg: &FileConfig, callsign: Option<String>, request: RespotRequest) -> Result<()> {
    let section = &cfg.wwff;
    let Some(callsign) = callsign.or_else(|| section.callsign.clone()) else {
        bail!("--callsign is required for wwff (or set [wwff] callsign in the config)");
    };
    let mut options = RespotOptions::new(&callsign);
    if let Some(host) = &section.host {
        options.host = host.clone();
    }
    if let Some(port) = section.port {
        options.port = port;
    }
    if let Some(timeout) = secs(section.timeout_secs) {
        options.overall_timeout = timeout;
    }
    if let Some(ms) = section.settle_ms {
        options.settle = Duration::from_millis(ms);
    }

    println!("Posting: {}", request.command_line());
    let outcome = WwffRespotter::new(options)
        .respot(&request)
        .await
        .context("respot failed")?;
    println!("Result: {outcome:?}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let cfg = FileConfig::load(cli.config.as_deref())?;
    tracing::debug!(config = ?cli.config, adapters = ?hamlink::enabled_adapters(), "Starting");

    match cli.command {
        Command::Wsjtx {
            action: WsjtxAction::Listen {
                port,
                bind,
                duration,
            },
        } => cmd_wsjtx_listen(&cfg, port, bind, duration).await,

        Command::Smartsdr { host, port, action } => {
            let sdr = create_smartsdr(&cfg, host, port)?;
            let result = match wait_connected(&sdr).await {
                Ok(()) => match &action {
                    SmartSdrAction::Spot(args) => cmd_smartsdr_spot(&sdr, args).await,
                    SmartSdrAction::Cw { text, wpm } => cmd_smartsdr_cw(&sdr, text, *wpm).await,
                    SmartSdrAction::Tune {
                        freq_khz,
                        mode,
                        slice,
                    } => cmd_smartsdr_tune(&sdr, *slice, *freq_khz, mode.as_deref()).await,
                },
                Err(e) => Err(e),
            };
            sdr.disconnect().await;
            result
        }

        Command::Tci { host, port, action } => {
            let tci = create_tci(&cfg, host, port)?;
            let result = match wait_connected(&tci).await {
                Ok(()) => match &action {
                    TciAction::Spot(args) => cmd_tci_spot(&tci, args).await,
                    TciAction::Tune { freq_khz, mode } => {
                        let freq_hz = hamlink::khz_to_hz(*freq_khz);
                        tci.tune(freq_hz, mode.as_deref()).await;
                        println!("Tuned to {}", format_freq_mhz(freq_hz));
                        Ok(())
                    }
                },
                Err(e) => Err(e),
            };
            tci.disconnect().await;
            result
        }

        Command::Pskreporter {
            action: PskReporterAction::Poll {
                mode,
                app_contact,
                duration,
            },
        } => cmd_pskreporter_poll(&cfg, mode, app_contact, duration).await,

        Command::Wwff {
            action: WwffAction::Respot {
                callsign,
                freq_khz,
                activator,
                reference,
                mode,
                comment,
            },
        } => {
            let request = RespotRequest {
                freq_khz,
                activator,
                reference,
                mode,
                comment,
            };
            cmd_wwff_respot(&cfg, callsign, request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_smartsdr_spot() {
        let cli = Cli::try_parse_from([
            "hamlink-test-app",
            "smartsdr",
            "--host",
            "10.0.0.2",
            "spot",
            "--call",
            "k1abc",
            "--freq-khz",
            "14062",
            "--source",
            "sota",
        ])
        .unwrap();
        let Command::Smartsdr {
            host,
            action: SmartSdrAction::Spot(args),
            ..
        } = cli.command
        else {
            panic!("wrong subcommand");
        };
        assert_eq!(host.as_deref(), Some("10.0.0.2"));
        let spot = build_spot(&args);
        assert_eq!(spot.callsign, "K1ABC");
        assert_eq!(spot.freq_hz, 14_062_000);
        assert_eq!(spot.source, SpotSource::Sota);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hamlink-test-app",
            "wsjtx",
            "listen",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn describes_rejections_in_hex() {
        let text = describe_event(&AdapterEvent::CommandRejected {
            sequence: 7,
            code: 0x5000_002D,
            message: "bad".into(),
        });
        assert!(text.contains("seq 7 code 0x5000002D bad"));
    }
}
