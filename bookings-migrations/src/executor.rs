use crate::error::Error;

/// A database connection that can run the contents of a migration file.
///
/// Migration files usually hold several `;`-separated statements, so implementations must run
/// the whole text as one batch and consume every result the batch produces before returning.
/// Driver errors are reported as [Error::Migration] carrying the driver's message.
pub trait SqlBatchExecutor {
    /// Execute a multi-statement batch. Statements that ran before a failing statement stay applied.
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error>;

    /// Execute a multi-statement batch inside a transaction, so a failing statement undoes the
    /// whole batch.
    ///
    /// Only connections to databases with transactional DDL support this. The default
    /// implementation rejects the call.
    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        let _ = sql;
        Err(Error::InvalidConfiguration(
            "this database connection does not support transactional migration steps".to_string(),
        ))
    }
}

impl<E: SqlBatchExecutor + ?Sized> SqlBatchExecutor for &mut E {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        (**self).execute_batch(sql)
    }

    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        (**self).execute_batch_in_transaction(sql)
    }
}

impl<E: SqlBatchExecutor + ?Sized> SqlBatchExecutor for Box<E> {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        (**self).execute_batch(sql)
    }

    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        (**self).execute_batch_in_transaction(sql)
    }
}
