pub mod server;

use anyhow::Result;

/// What the binary was asked to do.
#[derive(Debug)]
pub enum Action {
    /// Serve the portal until ctrl-c.
    Server(server::Args),
}

impl Action {
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
