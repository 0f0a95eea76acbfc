//! Attached exec: the start stream plus terminal resize tracking.

use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use bollard::exec::ResizeExecOptions;

use super::terminal::{ResizeWatcher, TerminalSizeProvider};
use super::{ContainerExecClient, ExecRequest, exec_failed};
use crate::engine::stream::{DuplexSession, ReadySignal, SessionConfig};
use crate::engine::transport::{DaemonTransport, StreamRequest};
use crate::error::PodlinkError;

/// Upgraded `POST /exec/{id}/start` request for an attached exec.
pub(super) fn start_request(exec_id: &str, tty: bool) -> StreamRequest {
    StreamRequest::post(format!("/exec/{exec_id}/start"))
        .with_json_body(json!({ "Detach": false, "Tty": tty }))
        .upgraded()
}

pub(super) struct AttachedExec<'a, C, P> {
    pub(super) client: &'a C,
    pub(super) request: &'a ExecRequest,
    pub(super) exec_id: &'a str,
    pub(super) size_provider: &'a P,
}

impl<C: ContainerExecClient, P: TerminalSizeProvider> AttachedExec<'_, C, P> {
    /// Stream the exec until the daemon closes it, keeping the remote
    /// terminal sized to the local one while it runs.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "false positive triggered inside tokio::select! expansion"
    )]
    pub(super) async fn run<T>(
        &self,
        transport: &T,
        config: SessionConfig<'_>,
    ) -> Result<(), PodlinkError>
    where
        T: DaemonTransport + ?Sized,
    {
        let start = start_request(self.exec_id, self.request.tty());
        let (ready, armed) = ReadySignal::channel();
        let session = DuplexSession::run(transport, &start, config.with_ready(ready));
        tokio::pin!(session);
        let resizing = self.follow_terminal(armed);
        tokio::pin!(resizing);

        let mut tracking = true;
        loop {
            tokio::select! {
                biased;
                result = &mut session => return result.map_err(PodlinkError::from),
                () = &mut resizing, if tracking => tracking = false,
            }
        }
    }

    /// Resize once the stream is live, then again on every window change.
    ///
    /// Returns only when resizing stops; resize failures are not fatal to
    /// the exec.
    async fn follow_terminal(&self, armed: oneshot::Receiver<()>) {
        if !self.request.tty() {
            return;
        }
        let mut watcher = ResizeWatcher::subscribe().unwrap_or_else(|error| {
            debug!(%error, "window-change notifications unavailable");
            ResizeWatcher::inert()
        });
        if armed.await.is_err() {
            return;
        }

        loop {
            if let Err(error) = self.resize_to_terminal().await {
                warn!(
                    exec_id = self.exec_id,
                    %error,
                    "terminal resize failed; no longer tracking size"
                );
                return;
            }
            watcher.changed().await;
        }
    }

    async fn resize_to_terminal(&self) -> Result<(), PodlinkError> {
        let Some(size) = self.size_provider.terminal_size() else {
            return Ok(());
        };

        self.client
            .resize_exec(
                self.exec_id,
                ResizeExecOptions {
                    width: size.width,
                    height: size.height,
                },
            )
            .await
            .map_err(|error| {
                exec_failed(
                    self.request.container_id(),
                    format!("resize exec failed: {error}"),
                )
            })?;
        debug!(
            exec_id = self.exec_id,
            width = size.width,
            height = size.height,
            "exec terminal resized"
        );
        Ok(())
    }
}
