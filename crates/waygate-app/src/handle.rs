use tokio::sync::{mpsc, oneshot, watch};
use waygate_core::{CommandError, ConnectionView};

pub(crate) type Reply = oneshot::Sender<Result<(), CommandError>>;

/// Requests from handles to the runtime task.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(Reply),
    Disconnect(Reply),
    Toggle(Reply),
    DismissError,
    Refresh(oneshot::Sender<ConnectionView>),
    Shutdown,
}

/// Handle for issuing user actions and observing the connection.
///
/// Cheap to clone. All clones talk to the same runtime.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ConnectionView>,
}

impl RuntimeHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, view: watch::Receiver<ConnectionView>) -> Self {
        Self { commands, view }
    }

    /// Connect. Resolves once the tunnel is started or the attempt failed.
    ///
    /// # Errors
    ///
    /// `Busy` when another action is in flight, `InvalidTransition` when
    /// already connected or connecting, `Failed` with the classified cause.
    pub async fn connect(&self) -> Result<(), CommandError> {
        self.request(Command::Connect).await
    }

    /// Disconnect. Resolves once the local state is `Disconnected`.
    ///
    /// # Errors
    ///
    /// `Busy` when another action is in flight.
    pub async fn disconnect(&self) -> Result<(), CommandError> {
        self.request(Command::Disconnect).await
    }

    /// Disconnect when connected or connecting, otherwise connect.
    pub async fn toggle(&self) -> Result<(), CommandError> {
        self.request(Command::Toggle).await
    }

    /// Clear the error message; `Error` becomes `Disconnected`.
    pub async fn dismiss_error(&self) -> Result<(), CommandError> {
        self.send(Command::DismissError).await
    }

    /// Poll the bridge now and return the resulting view.
    pub async fn refresh(&self) -> Result<ConnectionView, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Refresh(tx)).await?;
        rx.await.map_err(|_| CommandError::RuntimeClosed)
    }

    /// Latest published view.
    pub fn view(&self) -> ConnectionView {
        self.view.borrow().clone()
    }

    /// Receiver notified after every change.
    pub fn watch(&self) -> watch::Receiver<ConnectionView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ConnectionView) -> bool,
    ) -> Result<ConnectionView, CommandError> {
        let mut rx = self.view.clone();
        let view = rx.wait_for(|view| predicate(view)).await.map_err(|_| CommandError::RuntimeClosed)?;
        Ok(view.clone())
    }

    /// Stop the runtime. Outstanding requests resolve with `RuntimeClosed`.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), CommandError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| CommandError::RuntimeClosed)?
    }

    async fn send(&self, command: Command) -> Result<(), CommandError> {
        self.commands.send(command).await.map_err(|_| CommandError::RuntimeClosed)
    }
}
