//! Presence runtime. Drives an [`AffectStateMachine`] on a tokio task.
//!
//! The runtime is the single control thread of the engine: control signals,
//! session events, remote events and cooldown expiry are all handled here,
//! one at a time. After every step the current [`PresenceSnapshot`] is
//! published on a `watch` channel for the presentation layer.

use aura_core::PresenceSnapshot;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PresenceError;
use crate::machine::{AffectStateMachine, PresenceComponents, PresenceInput};
use crate::remote::RemoteEvent;

enum Command {
    Connect(oneshot::Sender<Result<(), PresenceError>>),
    Disconnect(oneshot::Sender<()>),
    Mute(oneshot::Sender<()>),
    Unmute(oneshot::Sender<Result<(), PresenceError>>),
    EnterEditContext(oneshot::Sender<()>),
    LeaveEditContext(oneshot::Sender<Result<(), PresenceError>>),
}

/// Owner side of the engine. Consumed by [`run`](Self::run).
pub struct PresenceRuntime {
    machine: AffectStateMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    inputs: mpsc::UnboundedReceiver<PresenceInput>,
    snapshots: watch::Sender<PresenceSnapshot>,
}

/// Cloneable handle used by the application shell and the transport.
#[derive(Clone)]
pub struct PresenceHandle {
    commands: mpsc::UnboundedSender<Command>,
    inputs: mpsc::UnboundedSender<PresenceInput>,
    snapshots: watch::Receiver<PresenceSnapshot>,
}

impl PresenceRuntime {
    /// Wire up a runtime and its handle. Nothing runs until
    /// [`run`](Self::run) is awaited.
    pub fn new(components: PresenceComponents) -> Result<(Self, PresenceHandle), PresenceError> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let machine = AffectStateMachine::new(components, &input_tx)?;
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let runtime = Self {
            machine,
            commands: command_rx,
            inputs: input_rx,
            snapshots: snapshot_tx,
        };
        let handle = PresenceHandle {
            commands: command_tx,
            inputs: input_tx,
            snapshots: snapshot_rx,
        };
        Ok((runtime, handle))
    }

    /// Process events until `cancel` fires. Local sessions are closed before
    /// this returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("Presence runtime started");

        loop {
            self.publish();
            let deadline = self.machine.next_deadline();

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                Some(command) = self.commands.recv() => self.handle_command(command),

                Some(input) = self.inputs.recv() => self.machine.handle_input(input),

                () = wait_until(deadline) => {
                    self.machine.expire_cooldowns();
                }
            }
        }

        self.machine.disconnect();
        self.publish();
        tracing::info!("Presence runtime stopped");
    }

    /// Apply a control signal. The snapshot is published before the reply.
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let result = self.machine.connect();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.machine.disconnect();
                self.publish();
                let _ = reply.send(());
            }
            Command::Mute(reply) => {
                self.machine.mute();
                self.publish();
                let _ = reply.send(());
            }
            Command::Unmute(reply) => {
                let result = self.machine.unmute();
                self.publish();
                let _ = reply.send(result);
            }
            Command::EnterEditContext(reply) => {
                self.machine.enter_edit_context();
                self.publish();
                let _ = reply.send(());
            }
            Command::LeaveEditContext(reply) => {
                let result = self.machine.leave_edit_context();
                self.publish();
                let _ = reply.send(result);
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl PresenceHandle {
    pub async fn connect(&self) -> Result<(), PresenceError> {
        self.request(Command::Connect).await?
    }

    pub async fn disconnect(&self) -> Result<(), PresenceError> {
        self.request(Command::Disconnect).await
    }

    pub async fn mute(&self) -> Result<(), PresenceError> {
        self.request(Command::Mute).await
    }

    pub async fn unmute(&self) -> Result<(), PresenceError> {
        self.request(Command::Unmute).await?
    }

    pub async fn enter_edit_context(&self) -> Result<(), PresenceError> {
        self.request(Command::EnterEditContext).await
    }

    pub async fn leave_edit_context(&self) -> Result<(), PresenceError> {
        self.request(Command::LeaveEditContext).await?
    }

    /// Report an event from the remote conversation.
    pub fn remote_event(&self, event: RemoteEvent) -> Result<(), PresenceError> {
        self.inputs
            .send(PresenceInput::Remote(event))
            .map_err(|_| PresenceError::RuntimeStopped)
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshots.clone()
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshots.borrow().clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PresenceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| PresenceError::RuntimeStopped)?;
        rx.await.map_err(|_| PresenceError::RuntimeStopped)
    }
}
