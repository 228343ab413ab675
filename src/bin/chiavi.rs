use anyhow::Result;
use chiavi::cli::{actions, actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    match action {
        Action::Server { .. } => actions::server::handle(action).await?,
        Action::Purge { .. } => actions::purge::handle(action).await?,
    }

    Ok(())
}
