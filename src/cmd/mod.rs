//! CLI command implementations.
//!
//! | Module     | Commands handled     |
//! |------------|----------------------|
//! | `serve`    | `Serve`              |
//! | `db`       | `InitDb`, `Pictures` |
//! | `ask`      | `Ask`                |
//! | `config`   | `Config`             |

pub mod ask;
pub mod config;
pub mod db;
pub mod serve;

pub use ask::cmd_ask;
pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_pictures};
pub use serve::cmd_serve;
