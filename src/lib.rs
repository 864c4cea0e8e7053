pub mod chain;
pub mod config;
pub mod devchain_config;
pub mod dialogue;
pub mod env;
pub mod errors;
pub mod logging;
pub mod phase;
pub mod tracker;
pub mod validator;
