//! compat.rs — capability-based backend selection.
//!
//! Grounded on `dapper/_frame_eval/compatibility_policy.py`
//! (`FrameEvalCompatibilityPolicy`), renamed to runtime-neutral vocabulary per
//! SPEC_FULL §4.0: `is_supported_python` → `runtime_version_supported`,
//! `supports_sys_monitoring` → `supports_event_subscription_api`,
//! `is_incompatible_environment` → `hostile_environment`.

use std::collections::HashSet;

/// `(major, minor, patch)` runtime version triple.
pub type RuntimeVersion = (u32, u32, u32);

/// Deny-lists and version/platform bounds controlling backend selection.
///
/// Defaults mirror the Python source's `incompatible_debuggers`,
/// `incompatible_environment_vars`, and `incompatible_coverage_tools` tuples.
#[derive(Debug, Clone)]
pub struct CompatibilityPolicy {
    min_version: RuntimeVersion,
    max_version: RuntimeVersion,
    event_subscription_min_version: RuntimeVersion,
    supported_platforms: HashSet<(String, String)>,
    incompatible_debuggers: HashSet<String>,
    incompatible_env_vars: HashSet<String>,
    incompatible_coverage_tools: HashSet<String>,
}

impl Default for CompatibilityPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CompatibilityPolicy {
    pub fn builder() -> CompatibilityPolicyBuilder {
        CompatibilityPolicyBuilder::default()
    }

    /// Is `version` within the supported `[min, max]` band? Mirrors
    /// `is_supported_python`.
    pub fn runtime_version_supported(&self, version: RuntimeVersion) -> (bool, Option<String>) {
        if version < self.min_version {
            return (
                false,
                Some(format!(
                    "runtime {version:?} is older than the minimum supported {:?}",
                    self.min_version
                )),
            );
        }
        if version > self.max_version {
            return (
                false,
                Some(format!(
                    "runtime {version:?} is newer than the maximum supported {:?}",
                    self.max_version
                )),
            );
        }
        (true, None)
    }

    /// Mirrors `is_supported_platform`. An empty allow-list means "no
    /// platform restriction".
    pub fn platform_supported(&self, system: &str, arch: &str) -> bool {
        self.supported_platforms.is_empty()
            || self
                .supported_platforms
                .contains(&(system.to_ascii_lowercase(), arch.to_ascii_lowercase()))
    }

    /// Mirrors `supports_sys_monitoring`: does this runtime expose the
    /// event-subscription API at all?
    pub fn supports_event_subscription_api(&self, version: RuntimeVersion) -> bool {
        version >= self.event_subscription_min_version
    }

    /// Mirrors `is_incompatible_environment`: are known-hostile tools already
    /// loaded (other debuggers, IDE host processes, coverage instrumenters)?
    pub fn hostile_environment<'a>(
        &self,
        loaded_modules: impl IntoIterator<Item = &'a str>,
        env_vars: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        let modules_hit = loaded_modules
            .into_iter()
            .any(|m| self.incompatible_debuggers.contains(m) || self.incompatible_coverage_tools.contains(m));
        let env_hit = env_vars.into_iter().any(|v| self.incompatible_env_vars.contains(v));
        modules_hit || env_hit
    }

    /// Aggregate check, mirroring `evaluate_environment`.
    pub fn evaluate_environment<'a>(
        &self,
        version: RuntimeVersion,
        system: &str,
        arch: &str,
        loaded_modules: impl IntoIterator<Item = &'a str>,
        env_vars: impl IntoIterator<Item = &'a str>,
    ) -> EnvironmentEvaluation {
        let (version_ok, version_reason) = self.runtime_version_supported(version);
        EnvironmentEvaluation {
            version_supported: version_ok,
            version_reason,
            platform_supported: self.platform_supported(system, arch),
            supports_event_subscription: self.supports_event_subscription_api(version),
            hostile: self.hostile_environment(loaded_modules, env_vars),
        }
    }
}

/// Result of running every compatibility check together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentEvaluation {
    pub version_supported: bool,
    pub version_reason: Option<String>,
    pub platform_supported: bool,
    pub supports_event_subscription: bool,
    pub hostile: bool,
}

impl EnvironmentEvaluation {
    pub fn fully_compatible(&self) -> bool {
        self.version_supported && self.platform_supported && !self.hostile
    }
}

/// Builder so embedders can extend the deny-lists without constructing the
/// struct fields directly.
#[derive(Debug, Clone)]
pub struct CompatibilityPolicyBuilder {
    min_version: RuntimeVersion,
    max_version: RuntimeVersion,
    event_subscription_min_version: RuntimeVersion,
    supported_platforms: HashSet<(String, String)>,
    incompatible_debuggers: HashSet<String>,
    incompatible_env_vars: HashSet<String>,
    incompatible_coverage_tools: HashSet<String>,
}

impl Default for CompatibilityPolicyBuilder {
    fn default() -> Self {
        Self {
            min_version: (0, 0, 0),
            max_version: (u32::MAX, u32::MAX, u32::MAX),
            event_subscription_min_version: (3, 12, 0),
            supported_platforms: HashSet::new(),
            incompatible_debuggers: ["pydevd", "pdb", "ipdb"].iter().map(|s| s.to_string()).collect(),
            incompatible_env_vars: ["PYCHARM_HOSTED", "VSCODE_PID"].iter().map(|s| s.to_string()).collect(),
            incompatible_coverage_tools: ["coverage", "pytest_cov"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CompatibilityPolicyBuilder {
    pub fn version_band(mut self, min: RuntimeVersion, max: RuntimeVersion) -> Self {
        self.min_version = min;
        self.max_version = max;
        self
    }

    pub fn event_subscription_min_version(mut self, min: RuntimeVersion) -> Self {
        self.event_subscription_min_version = min;
        self
    }

    pub fn allow_platform(mut self, system: impl Into<String>, arch: impl Into<String>) -> Self {
        self.supported_platforms
            .insert((system.into().to_ascii_lowercase(), arch.into().to_ascii_lowercase()));
        self
    }

    pub fn deny_debugger(mut self, name: impl Into<String>) -> Self {
        self.incompatible_debuggers.insert(name.into());
        self
    }

    pub fn deny_env_var(mut self, name: impl Into<String>) -> Self {
        self.incompatible_env_vars.insert(name.into());
        self
    }

    pub fn build(self) -> CompatibilityPolicy {
        CompatibilityPolicy {
            min_version: self.min_version,
            max_version: self.max_version,
            event_subscription_min_version: self.event_subscription_min_version,
            supported_platforms: self.supported_platforms,
            incompatible_debuggers: self.incompatible_debuggers,
            incompatible_env_vars: self.incompatible_env_vars,
            incompatible_coverage_tools: self.incompatible_coverage_tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_band() {
        let p = CompatibilityPolicy::builder().version_band((3, 8, 0), (3, 13, 0)).build();
        assert!(p.runtime_version_supported((3, 10, 0)).0);
        assert!(!p.runtime_version_supported((3, 7, 0)).0);
        assert!(!p.runtime_version_supported((3, 14, 0)).0);
    }

    #[test]
    fn event_subscription_gate() {
        let p = CompatibilityPolicy::default();
        assert!(p.supports_event_subscription_api((3, 12, 0)));
        assert!(!p.supports_event_subscription_api((3, 11, 0)));
    }

    #[test]
    fn hostile_environment_defaults() {
        let p = CompatibilityPolicy::default();
        assert!(p.hostile_environment(["pdb"], []));
        assert!(p.hostile_environment([], ["VSCODE_PID"]));
        assert!(p.hostile_environment(["coverage"], []));
        assert!(!p.hostile_environment(["json", "re"], ["PATH"]));
    }

    #[test]
    fn platform_allow_list_empty_means_unrestricted() {
        let p = CompatibilityPolicy::default();
        assert!(p.platform_supported("linux", "x86_64"));
    }

    #[test]
    fn platform_allow_list_restricts() {
        let p = CompatibilityPolicy::builder().allow_platform("linux", "x86_64").build();
        assert!(p.platform_supported("Linux", "X86_64"));
        assert!(!p.platform_supported("windows", "x86_64"));
    }
}
