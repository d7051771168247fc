//! RAII guard for socket lifecycle management.
//!
//! The echo transaction acquires the guard before `open` so that every
//! exit path, including a failed open, ends with exactly one `close`.

use cellular_core::{ErrorCode, Socket};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// RAII guard closing a borrowed socket.
///
/// # Example
///
/// ```ignore
/// let mut guard = SocketGuard::new(&mut socket);
/// guard.open(net)?;
/// // ... exchange ...
/// guard.close()?; // explicit close reports the driver's result
/// // If not called, Drop closes and logs any failure
/// ```
pub struct SocketGuard<'a, S: Socket + ?Sized> {
    socket: &'a mut S,
    closed: bool,
}

impl<'a, S: Socket + ?Sized> SocketGuard<'a, S> {
    pub fn new(socket: &'a mut S) -> Self {
        Self {
            socket,
            closed: false,
        }
    }

    /// Close the socket now and return the driver's result.
    ///
    /// Later calls and the drop are no-ops.
    pub fn close(&mut self) -> Result<(), ErrorCode> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(transport = %self.socket.transport(), "Closing socket");
        self.socket.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: Socket + ?Sized> Deref for SocketGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.socket
    }
}

impl<S: Socket + ?Sized> DerefMut for SocketGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.socket
    }
}

impl<S: Socket + ?Sized> Drop for SocketGuard<'_, S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let transport = self.socket.transport();
        warn!(transport = %transport, "Socket guard dropped without close - closing");
        if let Err(code) = self.close() {
            warn!(
                transport = %transport,
                code = code.code(),
                "Socket close failed in Drop"
            );
        }
    }
}
