use anyhow::Result;
use oidc_session::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let action = start()?;

    // Handle the action
    match action {
        Action::Watch { .. } => actions::watch::handle(action).await?,
    }

    Ok(())
}
