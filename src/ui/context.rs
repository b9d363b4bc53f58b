//! Terminal detection for interactive vs CI output

use std::io::IsTerminal;

/// Environment variables set by common CI providers
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Decides between cliclack output and plain lines
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Inspect the current process
    pub fn detect() -> Self {
        Self::from_parts(
            std::io::stdout().is_terminal(),
            std::io::stdin().is_terminal(),
            |name| std::env::var_os(name).is_some(),
        )
    }

    /// Plain output regardless of the terminal
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    fn from_parts(stdout_tty: bool, stdin_tty: bool, is_set: impl Fn(&str) -> bool) -> Self {
        let in_ci = CI_VARS.iter().any(|name| is_set(name));
        Self {
            interactive: stdout_tty && stdin_tty && !in_ci,
        }
    }

    /// Whether prompts can be shown
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Whether to use spinners and cliclack framing
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}
