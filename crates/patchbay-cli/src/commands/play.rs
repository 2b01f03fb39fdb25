//! Headless client: joins a session, plays the patch and reads edits from stdin.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::Args;
use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use patchbay_dsp::AudioRunner;
use patchbay_engine::{AudioBus, AudioSettings, Channels, Instance, ObjectRegistry};
use patchbay_sync::{ActorId, DocumentManager, TcpCarrier};

use super::common::{load_config, stop_on_ctrl_c};
use crate::repl::{self, HELP};
use crate::session::{Flow, Session};

/// How often the main loop wakes up to tick and read input.
const MAIN_LOOP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Args)]
pub struct PlayArgs {
    /// Relay host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Relay port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Session to join (overrides the config file)
    #[arg(short, long)]
    session: Option<String>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start with DSP switched off
    #[arg(long)]
    no_dsp: bool,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.client.host = host;
    }
    if let Some(port) = args.port {
        config.client.port = port;
    }
    if let Some(session) = args.session {
        config.client.session = session;
    }
    config.validate()?;
    let client = config.client;

    let actor = client.actor.map_or_else(ActorId::random, ActorId::from_uuid);
    let manager =
        DocumentManager::new(actor, TcpCarrier::new()).with_pull_interval(client.pull_interval());
    let settings = AudioSettings {
        sample_rate: config.audio.sample_rate as f32,
        vector_size: config.audio.vector_size,
    };
    let (instance, runner) = Instance::new(
        ObjectRegistry::with_builtins(),
        manager,
        settings,
        Channels::default(),
    );
    let mut session = Session::new(instance);
    let bus = session.instance().bus().clone();
    bus.set_running(!args.no_dsp);

    tracing::info!(
        %actor,
        host = %client.host,
        port = client.port,
        session = %client.session,
        "joining"
    );
    session
        .instance_mut()
        .connect(&client.host, client.port, &client.session)?;

    println!(
        "Session '{}' on {}:{}",
        client.session, client.host, client.port
    );
    println!("  Sample rate: {} Hz", config.audio.sample_rate);
    println!("  Block size:  {} samples", config.audio.vector_size);
    println!("\n{HELP}\n");

    let running = stop_on_ctrl_c()?;
    let audio = spawn_audio_clock(
        runner,
        bus,
        config.audio.block_duration(),
        Arc::clone(&running),
    );
    let lines = spawn_line_reader();

    let stdout = std::io::stdout();
    while running.load(Ordering::SeqCst) {
        if let Err(err) = session.instance_mut().tick() {
            tracing::error!(%err, "tick failed");
        }

        let mut out = stdout.lock();
        loop {
            match lines.try_recv() {
                Ok(line) => match repl::parse(&line) {
                    Ok(Some(command)) => match session.execute(command, &mut out) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => running.store(false, Ordering::SeqCst),
                        Err(err) => writeln!(out, "error: {err}")?,
                    },
                    Ok(None) => {}
                    Err(err) => writeln!(out, "{err}")?,
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        session.flush_console(&mut out)?;
        out.flush()?;
        drop(out);

        thread::sleep(MAIN_LOOP_INTERVAL);
    }

    running.store(false, Ordering::SeqCst);
    session.instance_mut().disconnect()?;
    session.flush_console(&mut std::io::stdout())?;
    match audio.join() {
        Ok(blocks) => tracing::info!(blocks, "audio clock stopped"),
        Err(_) => tracing::error!("audio clock panicked"),
    }
    println!("Done!");
    Ok(())
}

/// Runs the chain once per block period until `running` is cleared.
///
/// Returns the number of blocks processed.
fn spawn_audio_clock(
    mut runner: AudioRunner,
    bus: AudioBus,
    block: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<u64> {
    thread::spawn(move || {
        let mut peak = 0.0_f32;
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            if bus.is_running() {
                runner.process_block();
                for signal in bus.take_outputs() {
                    for &sample in signal.as_slice() {
                        peak = peak.max(sample.abs());
                    }
                }
                if runner.ticks() % 1000 == 0 {
                    tracing::debug!(
                        ticks = runner.ticks(),
                        generation = runner.generation(),
                        peak,
                        "audio clock"
                    );
                    peak = 0.0;
                }
            }
            thread::sleep(block.saturating_sub(started.elapsed()));
        }
        runner.ticks()
    })
}

/// Forwards stdin lines to the main loop. The channel closes on EOF.
fn spawn_line_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
