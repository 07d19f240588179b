use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_sweep(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    let counts = state.scheduler().run_once().await?;

    println!(
        "Sweep complete: {} published, {} expired",
        counts.published, counts.expired
    );
    Ok(())
}
