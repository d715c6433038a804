use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use urf_reflector::config::{Args, ReflectorConfig};
use urf_reflector::gatekeeper::{Gatekeeper, GatekeeperConfig};
use urf_reflector::heard::NullHeardSink;
use urf_reflector::logging;
use urf_reflector::peer_protocol::PeerProtocol;
use urf_reflector::reflector::Reflector;
use urf_reflector::transcoder::NoTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ReflectorConfig::load(&args)
        .await
        .context("loading reflector configuration")?;

    logging::init_tracing(&config.log_level);
    tracing::info!(callsign = %config.reflector_callsign, port = config.listen_port, "starting reflector");

    let gatekeeper = Gatekeeper::new();
    gatekeeper
        .load(&GatekeeperConfig {
            transmitter_allow_file: config.transmitter_allow_file.clone(),
            node_allow_file: config.node_allow_file.clone(),
            peer_allow_file: config.peer_allow_file.clone(),
            blacklist_file: config.blacklist_file.clone(),
        })
        .await;

    let reflector = Arc::new(Reflector::new(&config, gatekeeper, Arc::new(NullHeardSink), Arc::new(NoTranscoder)));

    let peer_protocol = PeerProtocol::bind(reflector.clone(), &config)
        .await
        .context("failed to bind reflector socket")?;

    let cancellation_token = CancellationToken::new();

    let poll_interval = Duration::from_millis(config.access_list_poll_interval_ms);
    let poller_reflector = reflector.clone();
    let poller_token = cancellation_token.clone();
    let poller = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = poller_token.cancelled() => break,
                _ = ticker.tick() => poller_reflector.gatekeeper.reload_if_changed().await,
            }
        }
    });

    let protocol_token = cancellation_token.clone();
    let protocol_task = tokio::spawn(async move {
        peer_protocol.run(protocol_token).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            cancellation_token.cancel();
        }
        _ = cancellation_token.cancelled() => {}
    }

    let _ = tokio::join!(poller, protocol_task);
    tracing::info!("reflector shut down");
    Ok(())
}
