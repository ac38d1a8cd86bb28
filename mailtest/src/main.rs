use mailtest_common::{Signal, config::Config, internal, logging};
use mailtest_relay::Relay;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing or malformed SMTP_SERVER_PORT is fatal before anything
    // binds.
    let config = Config::from_env()?;
    logging::init(config.debug());

    let (shutdown, _) = broadcast::channel(64);
    let relay = Relay::new(config);

    let signaller = shutdown.clone();
    tokio::spawn(async move {
        if wait_for_shutdown().await.is_ok() {
            let _ = signaller.send(Signal::Shutdown);
        }
    });

    // Resolves once both endpoints have drained after the signal.
    relay.serve(shutdown).await?;

    internal!("Shut down");
    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    }

    Ok(())
}
