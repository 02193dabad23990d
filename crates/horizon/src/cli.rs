use std::path::PathBuf;

use clap::Parser;
use renderer::{parse_surface_size, PowerPreference};

#[derive(Parser, Debug)]
#[command(
    name = "horizon",
    author,
    version,
    about = "Animated sun, moon, and rolling horizon",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Initial window size (e.g. `1280x720`); still exports render at this size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Window title.
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "PREFERENCE", value_parser = parse_power)]
    pub power: Option<PowerPreference>,

    /// Freeze the scene at this timestamp (seconds) instead of animating.
    #[arg(long, value_name = "SECONDS", value_parser = parse_still_time)]
    pub still_time: Option<f32>,

    /// Render one frame on the CPU, write it to this PNG path, and exit.
    #[arg(long, value_name = "PATH", value_parser = parse_export_path)]
    pub still_export: Option<PathBuf>,

    /// Read settings from this TOML file instead of the default location.
    #[arg(long, value_name = "FILE", env = "HORIZON_CONFIG")]
    pub config: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_power(value: &str) -> Result<PowerPreference, String> {
    value.parse()
}

pub fn parse_still_time(value: &str) -> Result<f32, String> {
    let seconds: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid timestamp '{value}'; expected seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("timestamp must be a non-negative number, got {seconds}"));
    }
    Ok(seconds)
}

pub fn parse_export_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(path),
        None => Err("export path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported export format '.{other}'; expected .png"
        )),
    }
}
