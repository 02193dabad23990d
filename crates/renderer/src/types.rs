use std::fmt;
use std::str::FromStr;

use crate::runtime::RenderPolicy;
use crate::shaders::ShaderSources;

/// Adapter power preference handed to `wgpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    Low,
    /// Prefer a discrete GPU when one is available.
    #[default]
    High,
}

impl FromStr for PowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "low-power" => Ok(Self::Low),
            "high" | "high-performance" => Ok(Self::High),
            other => Err(format!(
                "unknown power preference '{other}' (expected `low` or `high`)"
            )),
        }
    }
}

impl fmt::Display for PowerPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerPreference::Low => f.write_str("low"),
            PowerPreference::High => f.write_str("high"),
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels (still exports render at exactly this size).
    pub surface_size: (u32, u32),
    pub title: String,
    pub power: PowerPreference,
    /// Shaders compiled during setup.
    pub sources: ShaderSources,
    /// How time advances between frames.
    pub policy: RenderPolicy,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            title: "Horizon".to_string(),
            power: PowerPreference::default(),
            sources: ShaderSources::default(),
            policy: RenderPolicy::default(),
        }
    }
}

/// Parses `WIDTHxHEIGHT` into a pair of non-zero dimensions.
pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width '{width}': {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height '{height}': {err}"))?;
    if width == 0 || height == 0 {
        return Err(format!("surface size must be non-zero, got {width}x{height}"));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_surface_size(" 64X32 "), Ok((64, 32)));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("wide").is_err());
    }

    #[test]
    fn power_preference_round_trips_through_strings() {
        assert_eq!("high-performance".parse(), Ok(PowerPreference::High));
        assert_eq!("LOW".parse(), Ok(PowerPreference::Low));
        assert!("turbo".parse::<PowerPreference>().is_err());
        assert_eq!(PowerPreference::Low.to_string(), "low");
    }
}
