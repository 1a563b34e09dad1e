use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::packager::{PackOptions, ThemeSource};

#[derive(Parser, Debug)]
#[command(name = "dotlottie")]
#[command(version)]
#[command(about = "Pack and unpack .lottie animation archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  dotlottie pack wave.json --theme dark=wave-night.json   build wave.lottie\n  \
  dotlottie list wave.lottie -l                           show entry sizes\n  \
  dotlottie load https://example.com/wave.lottie --theme dark")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory archives are unpacked into
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Log progress (DOTLOTTIE_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a .lottie archive from an animation JSON file or URL
    Pack(PackArgs),
    /// List the entries of a .lottie archive
    List {
        /// Archive path
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Show sizes and compression ratio
        #[arg(short = 'l', long = "long")]
        long: bool,
    },
    /// Unpack an archive and print where its animations live
    Load {
        /// Archive path or HTTP URL
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Only print the animation for this theme
        #[arg(long, value_name = "KEY")]
        theme: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Base animation (.json path or URL)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Output directory (default: current directory)
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    pub destination: PathBuf,

    /// Themed variant, repeatable
    #[arg(long = "theme", value_name = "KEY=SOURCE", value_parser = parse_theme)]
    pub themes: Vec<ThemeSource>,

    /// Play the animation once
    #[arg(long)]
    pub no_loop: bool,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f32,

    /// Background color as #RRGGBB
    #[arg(long, value_name = "COLOR", default_value = "#ffffff")]
    pub theme_color: String,

    #[arg(long)]
    pub author: Option<String>,
}

impl PackArgs {
    pub fn options(&self) -> PackOptions {
        let defaults = PackOptions::default();
        PackOptions {
            loop_animation: !self.no_loop,
            speed: self.speed,
            theme_color: self.theme_color.clone(),
            author: self.author.clone().unwrap_or_else(|| defaults.author.clone()),
            ..defaults
        }
    }
}

fn parse_theme(value: &str) -> Result<ThemeSource, String> {
    match value.split_once('=') {
        Some((key, source)) if !key.is_empty() && !source.is_empty() => {
            Ok(ThemeSource::new(key, source))
        }
        _ => Err(format!("expected KEY=SOURCE, got '{value}'")),
    }
}
