//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `run`      | `Run`            |
//! | `check`    | `Check`          |
//! | `validate` | `Validate`       |
//! | `config`   | `Config`         |

pub mod check;
pub mod config;
pub mod run;
pub mod validate;

pub use check::cmd_check;
pub use config::cmd_config;
pub use run::cmd_run;
pub use validate::cmd_validate;
