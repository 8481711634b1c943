//! CLI command implementations.

mod doctor;
mod init;
mod list;
mod modes;
mod process;
mod sessions;

pub use doctor::run_doctor;
pub use init::run_init;
pub use list::run_list;
pub use modes::run_modes;
pub use process::run_process;
pub use sessions::{run_cancel, run_delete, run_result, run_status};
