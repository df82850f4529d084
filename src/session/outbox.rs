//! Outbound event delivery for one session.
//!
//! Per-frame status payloads go through a latest-value slot: a slow client
//! only ever receives the newest payload and never holds up the frame loop.
//! Notices and errors travel on an ordered queue and are never dropped. A
//! status published before a notice is delivered ahead of it.

use super::protocol::{Outbound, StatusPayload};
use tokio::sync::{mpsc, watch};

/// Notices and errors buffered before the session waits on the client.
pub const NOTICE_QUEUE: usize = 16;

/// Create a connected sender / stream pair.
pub fn channel() -> (EventSender, EventStream) {
    let (status_tx, status_rx) = watch::channel(StatusPayload::idle());
    let (notice_tx, notice_rx) = mpsc::channel(NOTICE_QUEUE);
    (
        EventSender {
            status: status_tx,
            notices: notice_tx,
        },
        EventStream {
            status: status_rx,
            notices: notice_rx,
            held: None,
            status_open: true,
            notices_open: true,
        },
    )
}

/// Session side of the event channel.
#[derive(Debug)]
pub struct EventSender {
    status: watch::Sender<StatusPayload>,
    notices: mpsc::Sender<Outbound>,
}

impl EventSender {
    /// Publish one event. Returns `false` once the client side is gone.
    pub async fn send(&self, event: Outbound) -> bool {
        match event {
            Outbound::Status(payload) => {
                self.status.send_replace(payload);
                !self.status.is_closed()
            }
            other => self.notices.send(other).await.is_ok(),
        }
    }
}

/// Client side of the event channel.
#[derive(Debug)]
pub struct EventStream {
    status: watch::Receiver<StatusPayload>,
    notices: mpsc::Receiver<Outbound>,
    held: Option<Outbound>,
    status_open: bool,
    notices_open: bool,
}

impl EventStream {
    /// Next event, or `None` once the session has ended and every queued
    /// notice was delivered. Cancel safe.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if let Some(event) = self.held.take() {
            return Some(event);
        }

        loop {
            if !self.status_open && !self.notices_open {
                return None;
            }

            tokio::select! {
                biased;
                notice = self.notices.recv(), if self.notices_open => match notice {
                    Some(notice) => {
                        if self.status.has_changed().unwrap_or(false) {
                            self.held = Some(notice);
                            return Some(self.latest());
                        }
                        return Some(notice);
                    }
                    None => self.notices_open = false,
                },
                changed = self.status.changed(), if self.status_open => match changed {
                    Ok(()) => return Some(self.latest()),
                    Err(_) => self.status_open = false,
                },
            }
        }
    }

    fn latest(&mut self) -> Outbound {
        Outbound::Status(self.status.borrow_and_update().clone())
    }
}
