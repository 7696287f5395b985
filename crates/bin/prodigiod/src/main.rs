//! # prodigiod: Prodigio daemon
//!
//! Composition root that wires the BLE adapter into the Prodigio client.
//!
//! ## Usage
//! - `prodigiod` polls every machine in range until Ctrl-C
//! - `prodigiod brew <address> [ristretto|espresso|lungo]` brews one cup
//! - `prodigiod inspect <address>` dumps every GATT descriptor
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no protocol logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use prodigio_adapter_ble::BtleplugTransport;
use prodigio_app::client::ProdigioClient;
use prodigio_app::error::ClientError;
use prodigio_domain::command::Volume;
use prodigio_domain::peripheral::PeripheralId;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

type Client = ProdigioClient<BtleplugTransport>;

#[derive(Debug, PartialEq)]
enum Command {
    Poll,
    Brew {
        id: PeripheralId,
        volume: Option<Volume>,
    },
    Inspect {
        id: PeripheralId,
    },
}

impl Command {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None => Self::Poll,
            Some("brew") => {
                let id = args
                    .next()
                    .context("usage: prodigiod brew <address> [volume]")?;
                let volume = args.next().map(|v| v.parse::<Volume>()).transpose()?;
                Self::Brew {
                    id: PeripheralId::new(id),
                    volume,
                }
            }
            Some("inspect") => {
                let id = args.next().context("usage: prodigiod inspect <address>")?;
                Self::Inspect {
                    id: PeripheralId::new(id),
                }
            }
            Some(other) => anyhow::bail!("unknown command {other:?}, expected `brew` or `inspect`"),
        };
        if let Some(extra) = args.next() {
            anyhow::bail!("unexpected argument {extra:?}");
        }
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).context("invalid logging filter")?,
        )
        .init();

    let command = Command::parse(std::env::args().skip(1))?;

    let transport = Arc::new(BtleplugTransport::new(&config.ble).await?);
    let client = ProdigioClient::from_config(Arc::clone(&transport), &config.client)?;
    let _disconnects = client.watch_disconnects(transport.disconnect_events().await?);

    match command {
        Command::Poll => poll(&client, config.poll.interval()).await,
        Command::Brew { id, volume } => brew(&client, &id, volume).await,
        Command::Inspect { id } => inspect(&client, &id).await,
    }
}

async fn poll(client: &Client, interval: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(interval_secs = interval.as_secs(), "polling Prodigio machines");
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                tracing::info!("shutting down");
                return Ok(());
            }
            () = async {
                ticker.tick().await;
                poll_once(client).await;
            } => {}
        }
    }
}

async fn poll_once(client: &Client) {
    let results = match client.update().await {
        Ok(results) => results,
        Err(ClientError::NoDevices) => {
            tracing::warn!("no Prodigio machine in range");
            return;
        }
        Err(err) => {
            tracing::warn!(error = %chain(err), "polling cycle failed, retrying next interval");
            return;
        }
    };

    for (id, result) in results {
        match result {
            Ok(report) => {
                let Some(bundle) = client.bundle(&id) else {
                    continue;
                };
                let snapshot = serde_json::to_string(&bundle.snapshot()).unwrap_or_default();
                tracing::info!(
                    %id,
                    failures = report.failures.len(),
                    %snapshot,
                    "machine refreshed"
                );
            }
            Err(err) => tracing::warn!(%id, error = %chain(err), "machine refresh failed"),
        }
    }
}

async fn brew(client: &Client, id: &PeripheralId, volume: Option<Volume>) -> anyhow::Result<()> {
    client.discover().await?;
    if let Some(volume) = volume {
        client.select_volume(id, volume)?;
    }
    client.brew(id).await?;
    Ok(())
}

async fn inspect(client: &Client, id: &PeripheralId) -> anyhow::Result<()> {
    client.discover().await?;
    anyhow::ensure!(client.bundle(id).is_some(), "machine {id} not found during scan");

    for reading in client.inspect(id).await? {
        println!(
            "{} {} {}",
            reading.descriptor.characteristic,
            reading.descriptor.uuid,
            hex::encode(&reading.value)
        );
    }
    Ok(())
}

/// Render an error with its whole source chain.
fn chain(err: ClientError) -> String {
    format!("{:#}", anyhow::Error::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        Command::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn should_poll_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), Command::Poll);
    }

    #[test]
    fn should_parse_brew_with_volume() {
        assert_eq!(
            parse(&["brew", "c4:7c:8d:6a:12:34", "Espresso"]).unwrap(),
            Command::Brew {
                id: PeripheralId::new("C4:7C:8D:6A:12:34"),
                volume: Some(Volume::Espresso),
            }
        );
    }

    #[test]
    fn should_parse_brew_without_volume() {
        assert_eq!(
            parse(&["brew", "C4:7C:8D:6A:12:34"]).unwrap(),
            Command::Brew {
                id: PeripheralId::new("C4:7C:8D:6A:12:34"),
                volume: None,
            }
        );
    }

    #[test]
    fn should_parse_inspect() {
        assert_eq!(
            parse(&["inspect", "C4:7C:8D:6A:12:34"]).unwrap(),
            Command::Inspect {
                id: PeripheralId::new("C4:7C:8D:6A:12:34"),
            }
        );
    }

    #[test]
    fn should_reject_bad_arguments() {
        assert!(parse(&["brew"]).is_err());
        assert!(parse(&["brew", "C4:7C:8D:6A:12:34", "doppio"]).is_err());
        assert!(parse(&["inspect"]).is_err());
        assert!(parse(&["descale"]).is_err());
        assert!(parse(&["inspect", "C4:7C:8D:6A:12:34", "extra"]).is_err());
    }
}
