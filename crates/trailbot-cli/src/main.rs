//! `trailbot-cli` – operator console for the Trailbot person follower.
//!
//! This binary:
//!
//! 1. Loads `~/.trailbot/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Starts the control loop against the simulated follow scene, wiring the
//!    loop's outputs through the event bus.
//! 3. Drops the operator into an **interactive REPL** (`/follow`, `/stop`,
//!    `/status`, `/policy`, `/help`, `/quit`).
//! 4. Intercepts **Ctrl-C** to stop following (zero command) before exiting.

mod config;
mod repl;

use colored::Colorize;
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use trailbot_middleware::{
    BusCommandSink, BusGreeter, BusMarkerSink, EventBus, FollowerAdapter, SimSceneAdapter, Topic,
    TopicReceiver,
};
use trailbot_runtime::{ControlHandle, ControlLoop, Outputs, init_tracing};
use trailbot_types::{BusPayload, FollowState, FollowerConfig, Policy};

fn main() {
    let _telemetry = init_tracing("trailbot");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            FollowerConfig::default()
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return;
        }
    };

    // ── Control loop ──────────────────────────────────────────────────────
    let bus = EventBus::default();
    let outputs = Outputs::new(
        BusCommandSink::new(bus.clone()),
        BusGreeter::new(bus.clone()),
        BusMarkerSink::new(bus.clone()),
    )
    .with_bus(bus.clone());

    let (control, handle) = match ControlLoop::new(cfg.clone(), outputs) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{}: {}", "Invalid configuration".red(), e);
            return;
        }
    };

    let scene = SimSceneAdapter::default();
    // Subscribe before the loop starts so no early command is dropped.
    let commands = bus.subscribe_to(Topic::Commands);
    let interaction = bus.subscribe_to(Topic::Interaction);
    let alerts = bus.subscribe_to(Topic::Alerts);

    runtime.spawn(control.run());
    runtime.spawn(relay_commands(scene.clone(), commands));
    runtime.spawn(feed_sensors(scene, handle.clone()));
    runtime.spawn(report_events(interaction, alerts));

    println!(
        "  Control loop running: policy {}, following {}",
        cfg.policy.to_string().bold(),
        if cfg.enabled { "on".green() } else { "off".yellow() }
    );

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_handle = handle.clone();
    let ctrlc_runtime = runtime.handle().clone();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the base …".yellow().bold());
        ctrlc_runtime.block_on(ctrlc_handle.set_following(FollowState::Stopped));
        println!("{}", "  ✓ Zero command sent.".green());
        println!("{}", "  ✓ Exiting Trailbot.".green());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the base first");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::Session::new(handle, runtime.handle().clone(), cfg).run(shutdown);

    runtime.shutdown_timeout(Duration::from_millis(500));
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Forward simulated sensor events into the control loop.
async fn feed_sensors(adapter: SimSceneAdapter, control: ControlHandle) {
    let mut events = adapter.sensor_stream().await;
    while let Some(event) = events.next().await {
        if control.submit(event).await.is_err() {
            info!("control loop stopped; sensor feed ending");
            break;
        }
    }
}

/// Deliver bus commands to the drive base.
async fn relay_commands(adapter: SimSceneAdapter, mut commands: TopicReceiver) {
    while let Some(event) = commands.next().await {
        if let BusPayload::Command(cmd) = event.payload
            && let Err(e) = adapter.execute_command(cmd).await
        {
            warn!(error = %e, "drive base rejected command");
        }
    }
}

async fn report_events(mut interaction: TopicReceiver, mut alerts: TopicReceiver) {
    loop {
        tokio::select! {
            Some(event) = interaction.next() => {
                if let BusPayload::Greeting(phrase) = event.payload {
                    info!(%phrase, "greeting");
                }
            }
            Some(event) = alerts.next() => {
                if let BusPayload::Fault { component, message } = event.payload {
                    warn!(%component, %message, "fault reported");
                }
            }
            else => break,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> FollowerConfig {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      Trailbot First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Trailbot.\n");

    let mut cfg = FollowerConfig::default();

    println!("  Which behavior should drive the base?");
    println!("    1) Blended proportional control  (default)");
    println!("    2) Search / avoid / approach / engage state machine");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.policy = match choice.trim() {
        "2" => Policy::StateMachine,
        _ => Policy::Blended,
    };

    let goal = prompt_line(
        &format!("  Following distance in meters [{}]: ", cfg.goal_z),
        &cfg.goal_z.to_string(),
    );
    if let Ok(z) = goal.trim().parse::<f32>()
        && z > 0.0
    {
        cfg.goal_z = z;
    }

    cfg.greeting = prompt_line(&format!("  Greeting [{}]: ", cfg.greeting), &cfg.greeting);

    if let Err(e) = cfg.validate() {
        println!("{}: {}", "Invalid answers, using defaults".red(), e);
        cfg = FollowerConfig::default();
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______           _ __ __          __ "#.bold().cyan());
    println!("{}", r#" /_  __/________ _(_) // /_  ____  / /_"#.bold().cyan());
    println!("{}", r#"  / / / ___/ __ `/ / // __ \/ __ \/ __/"#.bold().cyan());
    println!("{}", r#" / / / /  / /_/ / / // /_/ / /_/ / /_  "#.bold().cyan());
    println!("{}", r#"/_/ /_/   \__,_/_/_//_.___/\____/\__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Trailbot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Person-following mobile base");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
