use anyhow::{Result, anyhow};
use pico_args::Arguments;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    cell::RefCell,
    env,
    path::PathBuf,
    rc::Rc,
    sync::{Arc, atomic::AtomicBool},
};

use crate::celebration::Phase;
use crate::config::{self, Manifest, Platform};
use crate::scheduler::{Clock, ManualClock, SystemClock};
use crate::session::{Card, CardOptions};
use crate::sim::{self, Pacing, Script, SimDetector, SimDevices, SimInput, Step};
use crate::stage::LogStage;

struct RunFlags {
    realtime: bool,
    platform: Platform,
    assets: Option<PathBuf>,
    manifest: Option<PathBuf>,
    seed: Option<u64>,
    autoplay_blocked: bool,
}

impl RunFlags {
    fn parse(pargs: &mut Arguments) -> Result<Self> {
        Ok(Self {
            realtime: pargs.contains("--realtime"),
            platform: if pargs.contains("--mobile") {
                Platform::Mobile
            } else {
                Platform::Desktop
            },
            assets: pargs.opt_value_from_str("--assets")?,
            manifest: pargs.opt_value_from_str("--manifest")?,
            seed: pargs.opt_value_from_str("--seed")?,
            autoplay_blocked: pargs.contains("--no-autoplay"),
        })
    }
}

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.subcommand()?;

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("demo") => {
            let flags = RunFlags::parse(&mut pargs)?;
            let mut script = Script::demo();
            if flags.platform.mic_needs_gesture() {
                script.steps.push(Step {
                    at_ms: 100,
                    click: true,
                    ..Step::default()
                });
                script.steps.sort_by_key(|s| s.at_ms);
            }
            run_script(&script, &flags)
        }

        Some("replay") => {
            let flags = RunFlags::parse(&mut pargs)?;
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: cakectl replay <script.toml>"))?;
            let script = Script::load(&path)?;
            run_script(&script, &flags)
        }

        Some("manifest") => {
            let json = pargs.contains("--json");
            let path: Option<PathBuf> = pargs.opt_value_from_str("--manifest")?;
            let m = config::load_manifest(path.as_deref())?;
            if json {
                print_response(&serde_json::to_value(&m)?);
            } else {
                println!("title: {}", m.title);
                println!("audio: {} (volume {})", m.audio.src, m.audio.volume);
                for (i, mo) in m.moments.iter().enumerate() {
                    println!("  {:>2}. {:<16} {:<8} {}", i + 1, mo.src, mo.rating, mo.caption);
                }
            }
            Ok(())
        }

        Some("timeline") => {
            let m = Manifest::builtin()?;
            print_response(&timeline(m)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn run_script(script: &Script, flags: &RunFlags) -> Result<()> {
    let manifest = config::load_manifest(flags.manifest.as_deref())?;

    let input = Rc::new(RefCell::new(SimInput::default()));
    let mut devices = SimDevices::new(input.clone());
    devices.camera_ok = script.camera;
    devices.microphone_ok = script.microphone;

    let mut stage = LogStage::new().block_autoplay(flags.autoplay_blocked);
    if let Some(root) = &flags.assets {
        stage = stage.with_assets(root)?;
    }

    let (clock, pacing): (Box<dyn Clock>, Pacing) = if flags.realtime {
        let stop = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;
        (Box::new(SystemClock::new()), Pacing::Realtime(stop))
    } else {
        let c = ManualClock::new();
        (Box::new(c.clone()), Pacing::Virtual(c))
    };

    let options = CardOptions {
        platform: flags.platform,
        layout: script.layout.unwrap_or_default(),
        seed: flags.seed,
    };
    let mut card = Card::new(
        options,
        manifest,
        clock,
        Box::new(devices),
        Box::new(SimDetector::new(input.clone())),
        stage,
    );

    let summary = sim::replay(script, &input, &mut card, &pacing);
    print_response(&serde_json::to_value(&summary)?);
    Ok(())
}

/// Runs the demo on a virtual clock and reports when each phase began,
/// relative to the blow-out.
fn timeline(manifest: Manifest) -> Result<serde_json::Value> {
    let script = Script::demo();
    let clock = ManualClock::new();
    let input = Rc::new(RefCell::new(SimInput::default()));
    let mut card = Card::new(
        CardOptions {
            seed: Some(0),
            ..CardOptions::default()
        },
        manifest,
        Box::new(clock.clone()),
        Box::new(SimDevices::new(input.clone())),
        Box::new(SimDetector::new(input.clone())),
        LogStage::new(),
    );
    let summary = sim::replay(&script, &input, &mut card, &Pacing::Virtual(clock));
    let blown = card
        .celebration()
        .mark_of(Phase::SideBursts)
        .ok_or_else(|| anyhow!("demo never blew the candles out"))?;

    let phases: Vec<serde_json::Value> = card
        .celebration()
        .marks()
        .iter()
        .map(|(p, at)| {
            serde_json::json!({
                "phase": p,
                "offset_ms": at.saturating_sub(blown).as_millis() as u64,
            })
        })
        .collect();
    Ok(serde_json::json!({
        "ok": summary.completed(),
        "data": { "phases": phases }
    }))
}

fn print_help() {
    println!(
        r#"cakectl — gesture-driven birthday card (simulated)

USAGE:
  cakectl help [command]          Show general or command-specific help
  cakectl demo [flags]            Run the built-in session: light, blow, celebrate
  cakectl replay <script> [flags] Replay a scripted session from TOML
  cakectl manifest [--json]       Show the card content
  cakectl timeline                Show when each celebration phase starts

FLAGS (demo, replay):
  --realtime         Pace frames on the wall clock (Ctrl-C stops cleanly)
  --mobile           Mobile camera/detector settings; mic waits for a tap
  --assets <dir>     Check image/audio paths against this directory
  --manifest <path>  Use this manifest instead of ~/.config/cakectl/manifest.toml
  --seed <n>         Fix the confetti/firefly randomness
  --no-autoplay      Simulate a browser that blocks audio autoplay

TIPS:
  - Set RUST_LOG=debug (or trace) to watch every frame
  - Default manifest: ~/.config/cakectl/manifest.toml
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "demo" => println!(
            "usage: cakectl demo [--realtime] [--mobile] [--assets DIR] [--manifest PATH] [--seed N] [--no-autoplay]\nRuns a hand drifting onto the candles followed by a loud breath."
        ),
        "replay" => println!(
            "usage: cakectl replay <script.toml> [flags]\nScript keys: frame_ms, camera, microphone, [layout], [[step]] with at_ms, hand=[x,y], no_hand, volume, hover, click, detector_error."
        ),
        "manifest" => println!(
            "usage: cakectl manifest [--manifest PATH] [--json]\nPrints title, audio track and reel moments."
        ),
        "timeline" => println!(
            "usage: cakectl timeline\nPrints each celebration phase's start offset from the blow-out."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
