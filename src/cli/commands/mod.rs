//! CLI command implementations

pub mod completions;
pub mod config;
mod connect;
pub mod health;
pub mod login;
pub mod logout;
pub mod signup;
pub mod status;
pub mod watch;
pub mod whoami;

pub use completions::execute as completions;
pub use config::execute as config;
pub use connect::PASSWORD_ENV;
pub use health::execute as health;
pub use login::execute as login;
pub use logout::execute as logout;
pub use signup::execute as signup;
pub use status::execute as status;
pub use watch::execute as watch;
pub use whoami::execute as whoami;
