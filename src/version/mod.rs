//! Engine version detection
//!
//! The engine's version is probed once per session and drives CLI-dialect
//! selection, e.g. whether GPU visibility uses the `--gpus` flag or the
//! legacy `NVIDIA_VISIBLE_DEVICES` environment variable.

use std::fmt;

use tracing::warn;

use crate::error::Error;
use crate::runner::{ArgList, CommandRunner};

/// First engine version with `docker run --gpus` support.
const GPUS_FLAG_SINCE: (u32, u32, u32) = (19, 3, 0);

/// A parsed engine version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    major: u32,
    minor: u32,
    patch: u32,
    /// Pre-release tag, e.g. `ce` in `19.03.5-ce`.
    extra: Option<String>,
    /// Build identifier from the version banner.
    build: String,
}

impl EngineVersion {
    /// The documented fallback when the version cannot be determined: 0.0.0,
    /// which downgrades every feature gate to the conservative older-engine
    /// behavior.
    pub fn unknown() -> Self {
        Self {
            major: 0,
            minor: 0,
            patch: 0,
            extra: None,
            build: "0".to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            extra: None,
            build: "0".to_string(),
        }
    }

    /// Parse the output of `docker --version`, e.g.
    /// `Docker version 19.03.5, build 633a0ea`.
    pub fn parse(version_string: &str) -> Result<Self, Error> {
        let fail = || Error::VersionParse(version_string.to_string());

        let tokens: Vec<&str> = version_string.split_whitespace().collect();
        let build = tokens.last().ok_or_else(fail)?.to_string();
        let dotted = *tokens.get(2).ok_or_else(fail)?;
        let dotted = dotted.strip_suffix(',').unwrap_or(dotted);

        let mut parts = dotted.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(fail)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(fail)?;
        let last = parts.next().ok_or_else(fail)?;

        // The patch component may carry a hyphenated pre-release suffix.
        let (patch, extra) = match last.split_once('-') {
            Some((patch, extra)) => (patch, Some(extra.to_string())),
            None => (last, None),
        };
        let patch = patch.parse().map_err(|_| fail())?;

        Ok(Self {
            major,
            minor,
            patch,
            extra,
            build,
        })
    }

    /// Probe the engine once. Never fails the caller: any probe or parse
    /// problem logs a warning and yields [`EngineVersion::unknown`], since
    /// the build must remain operational against unknown engine versions.
    pub async fn probe(runner: &dyn CommandRunner) -> Self {
        let args = ArgList::from_tokens(["--version"]);
        let banner = match runner.run(&args).await {
            Ok(out) if out.success() => out.stdout.trim().to_string(),
            Ok(out) => {
                warn!(status = out.status, "Could not get engine version");
                return Self::unknown();
            }
            Err(e) => {
                warn!(error = %e, "Could not get engine version");
                return Self::unknown();
            }
        };

        match Self::parse(&banner) {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "Could not parse engine version");
                Self::unknown()
            }
        }
    }

    /// Whether `docker run --gpus` is available.
    ///
    /// Numeric tuple comparison; the legacy zero-padded string comparison
    /// misclassifies single- vs double-digit components.
    pub fn supports_gpus_flag(&self) -> bool {
        (self.major, self.minor, self.patch) > GPUS_FLAG_SINCE
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    /// Zero-padded `MM.mm.p` form, matching the engine's own banner style.
    pub fn version_string(&self) -> String {
        format!("{:02}.{:02}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extra {
            Some(extra) => write!(
                f,
                "Docker version {}-{}, build {}",
                self.version_string(),
                extra,
                self.build
            ),
            None => write!(
                f,
                "Docker version {}, build {}",
                self.version_string(),
                self.build
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    #[test]
    fn test_parse_release_version() {
        let v = EngineVersion::parse("Docker version 19.03.5, build 633a0ea").unwrap();
        assert_eq!(v.major(), 19);
        assert_eq!(v.minor(), 3);
        assert_eq!(v.patch(), 5);
        assert_eq!(v.extra(), None);
        assert_eq!(v.build(), "633a0ea");
    }

    #[test]
    fn test_parse_prerelease_version() {
        let v = EngineVersion::parse("Docker version 19.03.5-ce, build 633a0ea").unwrap();
        assert_eq!(v.patch(), 5);
        assert_eq!(v.extra(), Some("ce"));
        assert_eq!(v.build(), "633a0ea");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(EngineVersion::parse("").is_err());
        assert!(EngineVersion::parse("no version here").is_err());
        assert!(EngineVersion::parse("Docker version nineteen, build x").is_err());
    }

    #[tokio::test]
    async fn test_probe_parses_banner() {
        let runner = FakeRunner::new();
        runner.push(0, "Docker version 20.10.7, build f0df350\n");

        let v = EngineVersion::probe(&runner).await;
        assert_eq!((v.major(), v.minor(), v.patch()), (20, 10, 7));
        assert_eq!(runner.calls(), vec![vec!["--version".to_string()]]);
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_unknown() {
        let runner = FakeRunner::new();
        runner.push(0, "not a version banner");
        let v = EngineVersion::probe(&runner).await;
        assert_eq!(v, EngineVersion::unknown());

        let runner = FakeRunner::new();
        runner.push(1, "");
        let v = EngineVersion::probe(&runner).await;
        assert_eq!(v, EngineVersion::unknown());
    }

    #[test]
    fn test_gpus_flag_gate() {
        assert!(!EngineVersion::new(19, 3, 0).supports_gpus_flag());
        assert!(EngineVersion::new(19, 3, 5).supports_gpus_flag());
        assert!(EngineVersion::new(20, 10, 7).supports_gpus_flag());
        assert!(!EngineVersion::new(18, 9, 2).supports_gpus_flag());
        assert!(!EngineVersion::unknown().supports_gpus_flag());
        // Numeric comparison, not string: 9.x sorts below 19.x.
        assert!(!EngineVersion::new(9, 9, 9).supports_gpus_flag());
    }

    #[test]
    fn test_display_round_trip() {
        let v = EngineVersion::parse("Docker version 19.03.5-ce, build 633a0ea").unwrap();
        assert_eq!(v.to_string(), "Docker version 19.03.5-ce, build 633a0ea");
    }
}
