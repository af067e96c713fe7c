//! `settings.ini` and the legacy `version` member
//!
//! ```text
//! 4
//! Traceable=1
//! Generator=seg-io 0.1.0
//! ```
//!
//! Line one is the format version, line two the trace flag. The generator
//! line is informational and ignored on load.

use crate::error::CodecError;
use std::fmt;

const TRACEABLE_KEY: &str = "Traceable";
const GENERATOR_KEY: &str = "Generator";

/// Session-wide settings stored in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Format version
    pub version: u32,
    /// Whether the session keeps the full trace
    pub traceable: bool,
    /// Program that wrote the archive
    pub generator: Option<String>,
}

impl Settings {
    /// Settings written by a save
    #[must_use]
    pub fn new(version: u32, traceable: bool, generator: impl Into<String>) -> Self {
        let generator = generator.into();
        Self {
            version,
            traceable,
            generator: (!generator.is_empty()).then_some(generator),
        }
    }

    /// Parse `settings.ini`
    ///
    /// # Errors
    ///
    /// [`CodecError::Settings`] for a non-numeric version or a missing or
    /// malformed `Traceable` line.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let mut lines = raw.lines().map(str::trim);
        let version = parse_version(lines.next().unwrap_or_default())?;

        let traceable = lines
            .next()
            .and_then(|line| line.split_once('='))
            .filter(|(key, _)| key.trim() == TRACEABLE_KEY)
            .ok_or_else(|| CodecError::Settings("missing `Traceable` line".into()))?
            .1
            .trim();
        let traceable = match traceable {
            "0" => false,
            "1" => true,
            other => return Err(CodecError::Settings(format!("invalid `Traceable` value `{other}`"))),
        };

        let generator = lines
            .find_map(|line| line.strip_prefix(GENERATOR_KEY)?.strip_prefix('='))
            .map(str::to_string);
        Ok(Self {
            version,
            traceable,
            generator,
        })
    }

    /// Settings implied by a legacy `version` member: that version, trace
    /// mode off
    ///
    /// # Errors
    ///
    /// [`CodecError::Settings`] for a non-numeric version.
    pub fn from_legacy_version(raw: &str) -> Result<Self, CodecError> {
        Ok(Self {
            version: parse_version(raw.trim())?,
            traceable: false,
            generator: None,
        })
    }

    /// Text of `settings.ini`
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.version)?;
        writeln!(f, "{TRACEABLE_KEY}={}", u8::from(self.traceable))?;
        if let Some(generator) = &self.generator {
            writeln!(f, "{GENERATOR_KEY}={generator}")?;
        }
        Ok(())
    }
}

fn parse_version(raw: &str) -> Result<u32, CodecError> {
    raw.parse()
        .map_err(|_| CodecError::Settings(format!("invalid format version `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let settings = Settings::new(4, true, "seg-io test");
        assert_eq!(settings.render(), "4\nTraceable=1\nGenerator=seg-io test\n");
        assert_eq!(Settings::parse(&settings.render()).unwrap(), settings);
    }

    #[test]
    fn generator_line_is_optional() {
        let settings = Settings::parse("2\r\nTraceable=0\r\n").unwrap();
        assert_eq!(settings.version, 2);
        assert!(!settings.traceable);
        assert_eq!(settings.generator, None);
    }

    #[test]
    fn malformed_settings_are_rejected() {
        assert!(Settings::parse("four\nTraceable=1\n").is_err());
        assert!(Settings::parse("4\n").is_err());
        assert!(Settings::parse("4\nTraceable=yes\n").is_err());
        assert!(Settings::parse("4\nVersion=1\n").is_err());
    }

    #[test]
    fn legacy_version_disables_trace() {
        let settings = Settings::from_legacy_version("3\n").unwrap();
        assert_eq!(settings.version, 3);
        assert!(!settings.traceable);
    }
}
