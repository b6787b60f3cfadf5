use click_scheduler::messaging::channels::create_completion_channel;
use click_scheduler::{CpalOutput, MetronomePlayer, SettingsManager, VoiceSet};
use log::{error, info};
use std::thread;
use std::time::{Duration, Instant};

// Sized for several seconds of clicks at the fastest tempo and subdivision
const COMPLETION_RINGBUFFER_CAPACITY: usize = 64;
const DEFAULT_RUN_SECONDS: u64 = 8;
const UI_FRAME: Duration = Duration::from_millis(16);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Usage: click_scheduler [settings.ron] [seconds]
    let mut args = std::env::args().skip(1);
    let settings_path = args.next().unwrap_or_else(|| "metronome.ron".to_string());
    let run_for = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_RUN_SECONDS));

    let settings = match SettingsManager::new(&settings_path).load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load {}: {}", settings_path, e);
            std::process::exit(1);
        }
    };

    let (completion_tx, completion_rx) = create_completion_channel(COMPLETION_RINGBUFFER_CAPACITY);
    let (stream, output) = match CpalOutput::open_default(completion_tx) {
        Ok(opened) => opened,
        Err(e) => {
            error!("Failed to open audio output: {}", e);
            std::process::exit(1);
        }
    };

    let voices = VoiceSet::sine_clicks(stream.sample_rate());
    let (mut player, mut beats) = match MetronomePlayer::spawn(output, completion_rx, voices, &settings) {
        Ok(spawned) => spawned,
        Err(e) => {
            error!("Failed to start scheduler thread: {}", e);
            std::process::exit(1);
        }
    };

    println!("=== Click Scheduler ===");
    println!(
        "{} BPM, {}/{}, {} click(s) per beat on {}\n",
        settings.bpm, settings.beats_per_cycle, settings.denominator, settings.subdivision,
        stream.device_name()
    );

    player.start(true);

    // Halfway through, speed up to show a live reconfiguration
    let started = Instant::now();
    let mut tempo_changed = false;
    while started.elapsed() < run_for {
        beats.drain(|beat| {
            let marker = if beat == 0 { "●" } else { "○" };
            println!("{} beat {}", marker, beat + 1);
        });

        if !tempo_changed && started.elapsed() >= run_for / 2 {
            let bpm = settings.bpm + 20.0;
            info!("Changing tempo to {} BPM", bpm);
            player.set_tempo(bpm);
            tempo_changed = true;
        }

        thread::sleep(UI_FRAME);
    }

    player.stop();
    info!("{} clicks scheduled", player.transport().clicks_scheduled());
}
