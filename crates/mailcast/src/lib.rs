pub mod authz;
pub mod clock;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod model;
pub mod scheduler;
pub mod secrets;

pub use authz::{check, manual_send, Action, Decision, Notice, Permission, ResourceKind, Subject};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, Config};
pub use db::Database;
pub use dispatch::{BatchReport, DispatchReport, Dispatcher};
pub use error::{ConfigError, LoggingError, MailcastError, Result};
pub use mailer::{Envelope, Mailer, MemoryMailer};
pub use model::{AttemptStatus, Mailing, MailingStatus, Window};
pub use scheduler::{Scheduler, TickOutcome};
pub use secrets::{resolve_secret, SecretError, SecretSource};
