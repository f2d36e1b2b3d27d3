// SPDX-License-Identifier: MIT
//! Prerequisite probing (§4.6): decides whether a runner candidate's
//! declared requirements — executables on `PATH`, OS match, the runner's
//! own implicit dependencies — are satisfiable on this host. Best-effort
//! and cached for the process lifetime; a probing failure is treated as
//! "unsatisfied", never propagated as a hard error.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::tool::{Requirements, RunnerCandidate};
use crate::infrastructure::runner::{self, executable_on_path, platform_os};

/// The specific reason a candidate was rejected, surfaced to operators via
/// `validate`/`list` rather than swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmet {
    MissingExecutable(String),
    UnsupportedOs(String),
    RunnerPrerequisite(String),
}

pub struct PrerequisiteProber {
    cache: RwLock<HashMap<String, bool>>,
}

impl PrerequisiteProber {
    pub fn new() -> Self {
        Self { cache: RwLock::new(HashMap::new()) }
    }

    /// Declarative checks only: executables on `PATH`, OS name match.
    /// Does not probe the runner's own implicit requirements (e.g. Docker
    /// reachability) — that is async and handled separately by
    /// [`Self::probe_runner`].
    pub fn check_requirements(&self, requirements: &Requirements) -> Result<(), Unmet> {
        for exe in &requirements.executables {
            if !self.cached(&format!("exe:{exe}"), || executable_on_path(exe)) {
                return Err(Unmet::MissingExecutable(exe.clone()));
            }
        }
        if !requirements.os.is_empty() {
            let current = platform_os();
            if !requirements.os.iter().any(|os| os == current) {
                return Err(Unmet::UnsupportedOs(current.to_string()));
            }
        }
        Ok(())
    }

    /// The runner's own implicit requirements (§4.3's "Probed" column):
    /// `bwrap`/`sandbox-exec` on `PATH`, or a reachable Docker daemon.
    /// Probing failures are collapsed to "unsatisfied", never propagated.
    pub async fn probe_runner(&self, candidate: &RunnerCandidate) -> Result<(), Unmet> {
        self.check_requirements(&candidate.requirements)?;
        let runner = runner::build(candidate.kind);
        runner
            .probe_implicit_requirements()
            .await
            .map_err(|e| Unmet::RunnerPrerequisite(e.to_string()))
    }

    fn cached(&self, key: &str, probe: impl FnOnce() -> bool) -> bool {
        if let Some(result) = self.cache.read().expect("prober cache poisoned").get(key) {
            return *result;
        }
        let result = probe();
        self.cache.write().expect("prober cache poisoned").insert(key.to_string(), result);
        result
    }
}

impl Default for PrerequisiteProber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_reported_by_name() {
        let prober = PrerequisiteProber::new();
        let requirements = Requirements {
            executables: vec!["definitely-not-a-real-executable-xyz".to_string()],
            os: vec![],
        };
        assert_eq!(
            prober.check_requirements(&requirements),
            Err(Unmet::MissingExecutable("definitely-not-a-real-executable-xyz".to_string()))
        );
    }

    #[test]
    fn present_executable_passes() {
        let prober = PrerequisiteProber::new();
        let requirements = Requirements { executables: vec!["sh".to_string()], os: vec![] };
        assert!(prober.check_requirements(&requirements).is_ok());
    }

    #[test]
    fn os_mismatch_is_reported() {
        let prober = PrerequisiteProber::new();
        let requirements = Requirements {
            executables: vec![],
            os: vec!["definitely-not-an-os".to_string()],
        };
        assert!(matches!(prober.check_requirements(&requirements), Err(Unmet::UnsupportedOs(_))));
    }

    #[test]
    fn repeated_checks_use_the_cache() {
        let prober = PrerequisiteProber::new();
        let requirements = Requirements { executables: vec!["sh".to_string()], os: vec![] };
        assert!(prober.check_requirements(&requirements).is_ok());
        assert!(prober.check_requirements(&requirements).is_ok());
        assert_eq!(prober.cache.read().unwrap().len(), 1);
    }
}
