//! Terminal output
//!
//! Uses `cliclack` framing in an interactive terminal and falls back to plain
//! prefixed lines in CI or when output is piped.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    event_line, intro, key_value, key_value_status, outro_success, outro_warn, remark,
    step_error_detail, step_info, step_ok, step_warn_hint,
};
pub use progress::TaskSpinner;
pub use prompts::password;
pub use theme::{init_theme, MynofiTheme};
