pub mod add;
pub mod common;
pub mod config;
pub mod delete;
pub mod done;
pub mod edit;
pub mod list;
pub mod queue;
pub mod show;
pub mod status;
pub mod sync;

pub use add::run as add;
pub use config::run as config;
pub use delete::run as delete;
pub use edit::run as edit;
pub use list::run as list;
pub use queue::run as queue;
pub use show::run as show;
pub use status::run as status;
pub use sync::run as sync;
