use crate::core::errors::StreamError;

/// Sink for raw inbound frames of a stream session
///
/// The session calls `on_message` once per Text or Binary frame, in the order
/// the frames arrived, and never concurrently with itself. The next frame is
/// not read until the call returns, so a slow handler back-pressures the
/// socket. Control frames are handled by the transport and never delivered.
///
/// Any `FnMut(Vec<u8>) + Send + 'static` closure is a `MessageHandler`.
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, payload: Vec<u8>);
}

impl<F> MessageHandler for F
where
    F: FnMut(Vec<u8>) + Send + 'static,
{
    fn on_message(&mut self, payload: Vec<u8>) {
        self(payload);
    }
}

/// Sink for the error that ended a session unexpectedly
///
/// Consumed on use: a session invokes it at most once, and never when the
/// caller stopped the session.
pub trait ErrorHandler: Send + 'static {
    fn on_error(self, error: StreamError);
}

impl<F> ErrorHandler for F
where
    F: FnOnce(StreamError) + Send + 'static,
{
    fn on_error(self, error: StreamError) {
        self(error);
    }
}
