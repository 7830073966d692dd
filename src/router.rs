use std::{io, sync::Arc};

use tracing::debug;

use crate::{
    protocol,
    registry::{Registry, SessionHandle},
};

/// Stateless routing policy over the registry. Every delivery runs inside
/// the registry's critical section, so a message and a concurrent
/// unregister of its target cannot interleave. Targets are written to in
/// turn from the sender's own task; a stalled target delays the targets
/// after it.
///
/// Write failures split by direction: a target's dead connection is the
/// target's problem (its own session notices on its next read), so those
/// errors are swallowed. A failure writing to the sender is the sender's
/// disconnect and propagates.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Delivers `{sender}: {text}` to every participant except the sender.
    pub async fn broadcast(&self, sender: &str, text: &str) {
        self.deliver_except(sender, &protocol::chat_line(sender, text))
            .await;
    }

    /// Join and leave announcements: sent under the reserved `Server`
    /// identity, skipping the participant they describe.
    pub async fn announce(&self, about: &str, text: &str) {
        self.deliver_except(about, &protocol::chat_line(protocol::SERVER_SENDER, text))
            .await;
    }

    async fn deliver_except(&self, excluded: &str, line: &str) {
        let table = self.registry.table().await;
        for peer in table.values() {
            if peer.username() == excluded {
                continue;
            }
            if let Err(err) = peer.send_line(line).await {
                debug!(peer = peer.username(), error = ?err, "failed to deliver broadcast");
            }
        }
    }

    /// `/pm`: one message to the target plus an echo back to the sender,
    /// or a sender-only notice when the target is not online.
    pub async fn private_message(
        &self,
        sender: &SessionHandle,
        target: &str,
        text: &str,
    ) -> io::Result<()> {
        let table = self.registry.table().await;
        match table.get(target) {
            Some(peer) => {
                let message = protocol::private_line(sender.username(), text);
                if let Err(err) = peer.send_line(&message).await {
                    debug!(peer = target, error = ?err, "failed to deliver private message");
                }
                sender
                    .send_line(&protocol::private_echo_line(target, text))
                    .await
            }
            None => sender.send_line(&protocol::not_found_line(target)).await,
        }
    }

    /// `/file`: a notice line followed by the raw content line, delivered
    /// back to back so the target reads them as two consecutive lines.
    /// Content is one text line; there is no size guard, no chunking, and
    /// no binary safety.
    pub async fn file_transfer(
        &self,
        sender: &SessionHandle,
        target: &str,
        filename: &str,
        content: &str,
    ) -> io::Result<()> {
        let table = self.registry.table().await;
        match table.get(target) {
            Some(peer) => {
                let notice = protocol::file_notice_line(sender.username(), filename);
                let delivery = async {
                    peer.send_line(&notice).await?;
                    peer.send_line(content).await
                };
                if let Err(err) = delivery.await {
                    debug!(peer = target, error = ?err, "failed to deliver file");
                }
                Ok(())
            }
            None => sender.send_line(&protocol::not_found_line(target)).await,
        }
    }
}
