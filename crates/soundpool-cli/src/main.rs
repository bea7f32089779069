//! # soundpool
//!
//! Plays every file given on the command line at once, one channel each,
//! and exits when they have all finished.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Select};
use soundpool_audio::output::list_output_devices;
use soundpool_audio::{ChannelPool, MixerPool, PoolConfig, Sound};
use soundpool_core::{SoundEvent, MAX_CHANNELS};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for soundpool
#[derive(Parser, Debug)]
#[command(name = "soundpool")]
#[command(about = "Play MP3 and 16-bit WAV files over a shared channel pool")]
#[command(version)]
struct Args {
    /// Files to play
    #[arg(required_unless_present = "list_devices")]
    files: Vec<PathBuf>,

    /// Playback volume (0.0 = silent, 1.0 = unity)
    #[arg(short, long, default_value_t = 1.0, env = "SOUNDPOOL_VOLUME")]
    volume: f32,

    /// Number of output channels in the pool
    #[arg(short, long, default_value_t = MAX_CHANNELS, env = "SOUNDPOOL_CHANNELS")]
    channels: usize,

    /// Wait for a free channel instead of skipping the file
    #[arg(short, long, env = "SOUNDPOOL_WAIT")]
    wait: bool,

    /// Print output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soundpool=info,soundpool_audio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_devices {
        for name in list_output_devices().context("Failed to enumerate output devices")? {
            println!("{name}");
        }
        return Ok(());
    }

    if !(0.0..=1.0).contains(&args.volume) {
        bail!("volume must be between 0.0 and 1.0, got {}", args.volume);
    }
    if args.channels == 0 {
        bail!("at least one channel is required");
    }

    let pool = MixerPool::new(PoolConfig {
        channels: args.channels,
        ..PoolConfig::default()
    })
    .context("Failed to open audio output")?;
    let format = pool.format();
    info!(
        "Output: {} ({} Hz, {} ch), {} channels in pool",
        pool.device_name(),
        format.sample_rate,
        format.channels,
        pool.capacity()
    );

    let pool: Arc<dyn ChannelPool> = Arc::new(pool);
    let sounds: Vec<Sound> = args
        .files
        .iter()
        .map(|file| {
            let sound = Sound::new(file, Arc::clone(&pool));
            sound.set_volume(args.volume);
            sound
        })
        .collect();

    let receivers: Vec<_> = sounds.iter().map(Sound::events).collect();
    for sound in &sounds {
        info!("Playing {}", sound.file().display());
        sound.play(args.wait);
    }

    let failures = report(&sounds, &receivers);
    info!("All sounds finished");

    if failures == sounds.len() {
        bail!("no file could be played");
    }
    Ok(())
}

/// Log every sound's events until each run has ended.
///
/// Returns how many sounds did not play to the end.
fn report(sounds: &[Sound], receivers: &[Receiver<SoundEvent>]) -> usize {
    let mut select = Select::new();
    for rx in receivers {
        select.recv(rx);
    }

    let mut remaining = sounds.len();
    let mut failures = 0;
    while remaining > 0 {
        let op = select.select();
        let index = op.index();
        let Ok(event) = op.recv(&receivers[index]) else {
            select.remove(index);
            remaining -= 1;
            continue;
        };

        let file = sounds[index].file();
        let done = match event {
            SoundEvent::Finished { blocks } => {
                info!("{}: finished after {blocks} blocks", file.display());
                true
            }
            SoundEvent::Stopped { blocks } => {
                info!("{}: stopped after {blocks} blocks", file.display());
                failures += 1;
                true
            }
            SoundEvent::ChannelUnavailable => {
                warn!("{}: no free channel, skipped", file.display());
                failures += 1;
                true
            }
            SoundEvent::Error(e) => {
                error!("{}: {e}", file.display());
                failures += 1;
                true
            }
            SoundEvent::StateChanged(_) => false,
        };

        if done {
            select.remove(index);
            remaining -= 1;
        }
    }

    for sound in sounds {
        sound.wait();
    }
    failures
}
