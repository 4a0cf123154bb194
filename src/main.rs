use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tapshaper::bridge::{self, BridgeSpec};
use tapshaper::scenario::{self, ScenarioControls, ScenarioDriver};
use tapshaper::{EmulatorStats, LinkConfig, TapDevice, TapEndpoint, repl, script, worker};

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "tapshaper",
    author,
    version,
    disable_version_flag = true,
    about = "Link impairment emulator for bridged TAP interfaces"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// Source TAP interface name
    #[arg(long, default_value = "tap0")]
    srctap: String,
    /// Physical NIC bridged with the source TAP
    #[arg(long, default_value = "eth1_h")]
    srceth: String,
    /// Bridge joining the source TAP and NIC
    #[arg(long, default_value = "aif")]
    srcbr: String,
    /// Destination TAP interface name
    #[arg(long, default_value = "tap1")]
    dsttap: String,
    /// Physical NIC bridged with the destination TAP
    #[arg(long, default_value = "eth2_h")]
    dsteth: String,
    /// Bridge joining the destination TAP and NIC
    #[arg(long, default_value = "bif")]
    dstbr: String,

    /// Initial one-way delay in milliseconds, both directions
    #[arg(long = "delay_ms", default_value_t = 0)]
    delay_ms: i64,
    /// Scenario duration in milliseconds; 0 selects interactive mode
    #[arg(long = "total_time", default_value_t = 0)]
    total_time: i64,
    /// Event script replayed against the scenario timeline
    #[arg(long)]
    script: Option<PathBuf>,
    /// Run the built-in 40-second demo scenario
    #[arg(long)]
    demo: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Cli::parse();
    if args.print_version {
        let version = env!("CARGO_PKG_VERSION");
        let git_hash = env!("GIT_HASH");
        let git_branch = env!("GIT_BRANCH");
        let git_dirty = env!("GIT_DIRTY");

        println!(
            "{} ({}@{}{}) [{}]",
            version,
            git_branch,
            git_hash,
            git_dirty,
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    // Everything in this block is a setup error: abort with exit 1.
    let src = TapDevice::open(&args.srctap).context("open source tap")?;
    let dst = TapDevice::open(&args.dsttap).context("open destination tap")?;
    info!("taps ready: {} <-> {}", src.name(), dst.name());

    bridge::attach(
        &BridgeSpec {
            bridge: args.srcbr.clone(),
            nic: args.srceth.clone(),
        },
        src.name(),
    )?;
    bridge::attach(
        &BridgeSpec {
            bridge: args.dstbr.clone(),
            nic: args.dsteth.clone(),
        },
        dst.name(),
    )?;

    let a_to_b = LinkConfig::new();
    let b_to_a = LinkConfig::new();
    a_to_b.set_delay_ms(args.delay_ms);
    b_to_a.set_delay_ms(args.delay_ms);
    let stats = EmulatorStats::new();

    let src_fd = src.as_raw_fd();
    let dst_fd = dst.as_raw_fd();
    let mut endpoint_a =
        TapEndpoint::new(src, a_to_b.clone(), stats.a_to_b.clone()).context("source endpoint")?;
    let mut endpoint_b = TapEndpoint::new(dst, b_to_a.clone(), stats.b_to_a.clone())
        .context("destination endpoint")?;
    endpoint_a.set_peer(dst_fd);
    endpoint_b.set_peer(src_fd);

    let stop = Arc::new(AtomicBool::new(false));
    let workers = [
        worker::spawn(endpoint_a, stop.clone(), "a-to-b"),
        worker::spawn(endpoint_b, stop.clone(), "b-to-a"),
    ];

    if args.total_time > 0 || args.demo {
        let total_ms = if args.total_time > 0 {
            args.total_time
        } else {
            scenario::DEMO_TOTAL_MS
        };
        let mut driver = ScenarioDriver::new(a_to_b, b_to_a, total_ms);
        if let Some(path) = &args.script {
            driver.load(script::load_script(path)?);
        }
        if args.demo {
            driver.load(scenario::demo_events());
        }
        spawn_signal_watcher(Some(driver.controls()), stop.clone());
        driver.run().await;
    } else {
        repl::spawn_repl(a_to_b, b_to_a, stats.clone(), stop.clone());
        spawn_signal_watcher(None, stop.clone());
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        while !stop.load(Ordering::Relaxed) {
            ticker.tick().await;
        }
    }

    stop.store(true, Ordering::Relaxed);
    for handle in workers {
        let _ = handle.join();
    }
    info!("final counters: {}", stats.to_json());

    bridge::teardown(&args.srcbr);
    bridge::teardown(&args.dstbr);
    Ok(())
}

/// Translate SIGINT/SIGTERM into a stop request.
fn spawn_signal_watcher(controls: Option<ScenarioControls>, stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!("signal handler: {err}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        info!("shutdown requested");
        if let Some(controls) = controls {
            controls.stop();
        }
        stop.store(true, Ordering::Relaxed);
    });
}
