//! Output mode detection

use std::io::IsTerminal;

/// CI systems that set their own marker variable
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// Decides between styled and plain output
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    fancy: bool,
}

impl UiContext {
    /// Styled output only on an interactive stdout outside CI, and never
    /// when `BERTH_PLAIN` is set
    pub fn detect() -> Self {
        let fancy = std::io::stdout().is_terminal()
            && std::env::var_os("BERTH_PLAIN").is_none()
            && !CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self { fancy }
    }

    /// Plain output regardless of environment
    pub fn non_interactive() -> Self {
        Self { fancy: false }
    }

    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }
}
