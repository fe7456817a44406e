//! Channel plumbing shared by all actors. Each message carries the tracing
//! span it was sent from so handlers keep causal context across tasks.

pub mod broadcast;
pub mod engine;
pub mod window_notify;

use tokio::sync::mpsc;
use tracing::Span;

pub struct Sender<T>(mpsc::UnboundedSender<(Span, T)>);

// Derived Clone would require T: Clone.
impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender(self.0.clone())
    }
}

pub struct Receiver<T>(mpsc::UnboundedReceiver<(Span, T)>);

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender(tx), Receiver(rx))
}

impl<T> Sender<T> {
    /// Sends `event`, returning it back if the receiving actor is gone.
    pub fn send(&self, event: T) -> Result<(), T> {
        self.0.send((Span::current(), event)).map_err(|err| err.0.1)
    }
}

impl<T> Receiver<T> {
    pub async fn recv(&mut self) -> Option<(Span, T)> {
        self.0.recv().await
    }

    pub fn try_recv(&mut self) -> Result<(Span, T), mpsc::error::TryRecvError> {
        self.0.try_recv()
    }
}
