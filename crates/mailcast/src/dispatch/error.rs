use thiserror::Error;

use crate::db::DatabaseError;

/// Errors that abort a dispatch.
///
/// A recipient the mailer rejects is not one of these: it becomes a
/// `Failure` attempt and the loop moves on.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Storage error during dispatch: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailing {0} not found")]
    MailingNotFound(i64),

    #[error("Message {message_id} of mailing {mailing_id} not found")]
    MessageNotFound { mailing_id: i64, message_id: i64 },

    #[error("Mailing {0} is already being dispatched")]
    Busy(i64),
}
