//! Handler contract for the operation queue.

use std::{fmt, marker::PhantomData};

/// Policy half of an [`OperationQueue`](crate::OperationQueue).
///
/// The queue owns ordering and single-flight; the handler owns semantics:
/// - `validate`: cheap admission check, run right before dispatch. A rejected
///   operation is dropped and passed to `report`. It is never retried.
/// - `dispatch`: does the work and takes ownership of the operation. Returning
///   an error passes it to `report`.
/// - `report`: the error channel for rejected and failed operations.
///
/// All three run on the queue's consumer task, one operation at a time.
pub trait OperationHandler: Send + 'static {
    /// Operation type carried by the queue.
    type Op: Send + 'static;

    /// Error produced by validation or dispatch.
    type Error: fmt::Display + Send + 'static;

    /// Decide whether `op` may be dispatched now.
    fn validate(&mut self, op: &Self::Op) -> Result<(), Self::Error>;

    /// Process `op`.
    fn dispatch(&mut self, op: Self::Op) -> Result<(), Self::Error>;

    /// Receive the error of a rejected or failed operation.
    fn report(&mut self, error: Self::Error);
}

/// [`OperationHandler`] assembled from three closures.
///
/// ```ignore
/// let handler = FnHandler::new(
///     |_op: &Cmd| Ok(()),
///     |op: Cmd| apply(op),
///     |err: MyError| warn!(%err, "command failed"),
/// );
/// let queue = OperationQueue::spawn(handler, &cancel);
/// ```
pub struct FnHandler<Op, E, V, D, R> {
    validate: V,
    dispatch: D,
    report: R,
    _marker: PhantomData<fn(Op) -> E>,
}

impl<Op, E, V, D, R> FnHandler<Op, E, V, D, R>
where
    V: FnMut(&Op) -> Result<(), E>,
    D: FnMut(Op) -> Result<(), E>,
    R: FnMut(E),
{
    /// Create a handler from validate, dispatch and report closures.
    pub fn new(validate: V, dispatch: D, report: R) -> Self {
        Self {
            validate,
            dispatch,
            report,
            _marker: PhantomData,
        }
    }
}

impl<Op, E, V, D, R> OperationHandler for FnHandler<Op, E, V, D, R>
where
    Op: Send + 'static,
    E: fmt::Display + Send + 'static,
    V: FnMut(&Op) -> Result<(), E> + Send + 'static,
    D: FnMut(Op) -> Result<(), E> + Send + 'static,
    R: FnMut(E) + Send + 'static,
{
    type Op = Op;
    type Error = E;

    fn validate(&mut self, op: &Op) -> Result<(), E> {
        (self.validate)(op)
    }

    fn dispatch(&mut self, op: Op) -> Result<(), E> {
        (self.dispatch)(op)
    }

    fn report(&mut self, error: E) {
        (self.report)(error);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn fn_handler_forwards_calls() {
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let reported = Arc::new(Mutex::new(Vec::new()));

        let mut handler = FnHandler::new(
            |op: &u32| {
                if *op == 0 {
                    Err("zero".to_string())
                } else {
                    Ok(())
                }
            },
            {
                let dispatched = Arc::clone(&dispatched);
                move |op: u32| {
                    dispatched.lock().push(op);
                    Ok(())
                }
            },
            {
                let reported = Arc::clone(&reported);
                move |err: String| reported.lock().push(err)
            },
        );

        assert!(handler.validate(&0).is_err());
        assert!(handler.validate(&1).is_ok());
        assert!(handler.dispatch(1).is_ok());
        handler.report("late".to_string());

        assert_eq!(*dispatched.lock(), vec![1]);
        assert_eq!(*reported.lock(), vec!["late".to_string()]);
    }
}
