mod cli;

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use barplayer::error::AppError;
use barplayer::player::{BACKENDS, PlaybackState, Player};
use barplayer::{logging, settings};
use clap::Parser;
use cli::{Cli, Command};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Probing and topology setup on top of the HTTP timeout
const OPEN_SLACK: Duration = Duration::from_secs(5);

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(settings::default_data_dir);
    let _log_guard = logging::init(
        &data_dir,
        logging::LogConfig {
            dir: cli.log_dir.clone(),
            filter: cli.log_filter.clone(),
        },
    );
    tracing::info!(data_dir = %data_dir.display(), "barplayer starting");

    let mut engine = settings::load_settings(&data_dir);
    if let Some(backend) = cli.backend.clone() {
        engine.backend = Some(backend);
    }

    match cli.command {
        Command::Backends => {
            for (i, d) in BACKENDS.iter().enumerate() {
                println!("{}. {:<8} {}", i + 1, d.id, d.name);
            }
            Ok(())
        }
        Command::Play { url, volume, gain } => {
            if let Some(v) = volume {
                engine.volume = v;
            }
            if let Some(g) = gain {
                engine.gain_db = g;
            }
            let mut player = Player::init(&engine)?;
            println!("backend: {}", player.backend_name());
            let open_timeout = Duration::from_secs(engine.http_timeout_secs) + OPEN_SLACK;
            play_to_end(&mut player, &url, open_timeout)
        }
    }
}

/// Poll until the open settles. Gives up and tears the session down once
/// `timeout` passes.
fn wait_for_open(player: &mut Player, url: &str, timeout: Duration) -> Result<(), AppError> {
    let deadline = Instant::now() + timeout;
    while player.state() == PlaybackState::OpenPending {
        if Instant::now() >= deadline {
            tracing::warn!(url, timeout_secs = timeout.as_secs(), "open did not complete");
            player.finish();
            return Err(AppError::Other(format!("timed out opening {url}")));
        }
        thread::sleep(POLL_INTERVAL / 10);
    }
    Ok(())
}

fn play_to_end(player: &mut Player, url: &str, open_timeout: Duration) -> Result<(), AppError> {
    if !player.open(url) {
        return Err(AppError::Other(format!("cannot open {url}")));
    }
    // the session backend starts by itself once the topology is ready
    wait_for_open(player, url, open_timeout)?;
    if player.is_stopped() && !player.play() {
        return Err(AppError::Other(format!("cannot play {url}")));
    }
    if player.state() == PlaybackState::Closed {
        return Err(AppError::Other(format!("cannot open {url}")));
    }

    let mut out = std::io::stdout();
    loop {
        if player.is_playing() || player.is_paused() {
            write!(out, "{}\r", format_time(player.time(), player.duration()))?;
            out.flush()?;
        }
        if player.state() == PlaybackState::Closed || player.is_finished() {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    writeln!(out)?;

    if player.state() != PlaybackState::Closed {
        player.finish();
    }
    tracing::info!(url, "playback finished");
    Ok(())
}

/// `-MM:SS/MM:SS` remaining/total, `+` once the position overruns.
fn format_time(played: f64, duration: f64) -> String {
    let (sign, remaining) = if played <= duration {
        ('-', duration - played)
    } else {
        ('+', played - duration)
    };
    let remaining = remaining as u64;
    let total = duration as u64;
    format!(
        "{sign}{:02}:{:02}/{:02}:{:02}",
        remaining / 60,
        remaining % 60,
        total / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use barplayer::player::{BackendDescriptor, PlayerBackend, StateMachine, Transition};
    use barplayer::{EngineSettings, PlayerError};

    /// Accepts an open and never completes it.
    #[derive(Default)]
    struct NeverOpens {
        machine: StateMachine,
    }

    impl PlayerBackend for NeverOpens {
        fn set_volume(&mut self, _: f32) {}
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_gain(&mut self, _: f32) {}
        fn gain(&self) -> f32 {
            0.0
        }
        fn duration(&self) -> Duration {
            Duration::ZERO
        }
        fn time(&self) -> Duration {
            Duration::ZERO
        }
        fn open(&mut self, _: &str) -> Result<(), PlayerError> {
            self.machine.apply(Transition::Open).map(|_| ())
        }
        fn play(&mut self) -> Result<(), PlayerError> {
            self.machine.apply(Transition::Play).map(|_| ())
        }
        fn pause(&mut self) -> Result<(), PlayerError> {
            self.machine.apply(Transition::Pause).map(|_| ())
        }
        fn stop(&mut self) -> Result<(), PlayerError> {
            self.machine.apply(Transition::Stop).map(|_| ())
        }
        fn finish(&mut self) -> Result<(), PlayerError> {
            if self.machine.state() != PlaybackState::Closed {
                self.machine.apply(Transition::Finish)?;
            }
            Ok(())
        }
        fn state(&self) -> PlaybackState {
            self.machine.state()
        }
        fn is_finished(&self) -> bool {
            false
        }
    }

    #[test]
    fn open_that_never_completes_times_out() {
        let table = [BackendDescriptor {
            id: "stuck",
            name: "never opens",
            create: |_| Ok(Box::new(NeverOpens::default())),
        }];
        let mut player = Player::with_backends(&table, &EngineSettings::default()).expect("player");

        let started = Instant::now();
        let err = play_to_end(&mut player, "http://host/a.mp3", Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, AppError::Other(ref m) if m.contains("timed out")), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(player.state(), PlaybackState::Closed);
    }

    #[test]
    fn remaining_time_counts_down() {
        assert_eq!(format_time(0.0, 185.0), "-03:05/03:05");
        assert_eq!(format_time(65.4, 185.0), "-01:59/03:05");
        assert_eq!(format_time(0.0, 0.0), "-00:00/00:00");
    }

    #[test]
    fn overrun_is_marked() {
        assert_eq!(format_time(190.0, 185.0), "+00:05/03:05");
    }
}
