use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "barplayer", version, about = "Stream an audio URL through the barplayer engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Override the data directory (defaults to the platform's data_local_dir)
    #[arg(long, env = "BARPLAYER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the log directory (defaults to `{data_dir}/logs`)
    #[arg(long, env = "BARPLAYER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log filter, same syntax as RUST_LOG
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    /// Backend to probe first (`session` or `graph`)
    #[arg(long, env = "BARPLAYER_BACKEND")]
    pub backend: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Play one URL to the end, printing remaining/total time
    Play {
        url: String,

        /// Master volume, 0.0..=1.0
        #[arg(long)]
        volume: Option<f32>,

        /// Replay gain in dB
        #[arg(long, allow_hyphen_values = true)]
        gain: Option<f32>,
    },

    /// List registered backends in probe order
    Backends,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_accepts_negative_gain() {
        let cli = Cli::try_parse_from([
            "barplayer",
            "--backend",
            "graph",
            "play",
            "http://example.test/a.mp3",
            "--gain",
            "-6.5",
        ])
        .expect("parse");
        assert_eq!(cli.backend.as_deref(), Some("graph"));
        match cli.command {
            Command::Play { url, volume, gain } => {
                assert_eq!(url, "http://example.test/a.mp3");
                assert_eq!(volume, None);
                assert_eq!(gain, Some(-6.5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
