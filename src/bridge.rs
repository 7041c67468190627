/// Poll loop tying the Netatmo API to the MQTT bus
use log::{debug, error, info};
use tokio::time::{sleep, Duration};

use crate::credentials::CredentialStore;
use crate::error::{BridgeError, RefreshError};
use crate::mqtt::{MessageBus, PublishSummary, Publisher, TopicMapper};
use crate::netatmo::{RefreshOutcome, StationApi, TokenRefresher};

/// All state of a running bridge
///
/// One cycle runs refresh → fetch → map → publish to completion before the
/// next one is scheduled. A failed token refresh only raises `failure`; the
/// bridge then stops at the top of the next cycle. A failed fetch stops it
/// immediately.
pub struct Bridge<A, B, S> {
    refresher: TokenRefresher<S>,
    stations: A,
    mapper: TopicMapper,
    publisher: Publisher<B>,
    interval: Duration,
    failure: Option<BridgeError>,
}

impl<A, B, S> Bridge<A, B, S>
where
    A: StationApi,
    B: MessageBus,
    S: CredentialStore,
{
    pub fn new(
        refresher: TokenRefresher<S>,
        stations: A,
        mapper: TopicMapper,
        publisher: Publisher<B>,
        interval: Duration,
    ) -> Self {
        Self {
            refresher,
            stations,
            mapper,
            publisher,
            interval,
            failure: None,
        }
    }

    /// Poll until something fails
    ///
    /// Never returns `Ok`. The returned error is the reason for stopping; the
    /// bus has already been closed when it is returned.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        loop {
            if let Some(err) = self.failure.take() {
                return self.stop(err).await;
            }

            if let Err(err) = self.poll_once().await {
                return self.stop(err).await;
            }

            // The delay starts when the cycle is done, so cycles never overlap
            debug!("Next poll in {} seconds", self.interval.as_secs());
            let bus_failure = tokio::select! {
                () = sleep(self.interval) => None,
                err = self.publisher.bus().failed() => Some(err),
            };
            if let Some(err) = bus_failure {
                error!("MQTT bus failed: {}", err);
                self.failure = Some(err.into());
            }
        }
    }

    /// Run a single refresh → fetch → map → publish cycle
    pub async fn poll_once(&mut self) -> Result<PublishSummary, BridgeError> {
        info!("Getting station data");

        match self.refresher.ensure_fresh().await {
            Ok(RefreshOutcome::Refreshed) | Ok(RefreshOutcome::StillValid) => {}
            Err(RefreshError::Auth(e)) => {
                // Carry on with the current token; the flag ends the bridge next cycle
                error!("Token refresh failed: {}", e);
                self.failure = Some(BridgeError::Auth(e));
            }
            Err(RefreshError::Persist(e)) => return Err(e.into()),
        }

        let reading = self.stations.fetch(self.refresher.access_token()).await?;

        let pairs = self.mapper.map(&reading);
        let summary = self.publisher.publish_all(&pairs).await;
        info!(
            "Cycle complete: {} devices, {} values published, {} dropped",
            reading.devices.len(),
            summary.sent,
            summary.dropped
        );

        Ok(summary)
    }

    async fn stop(&mut self, err: BridgeError) -> Result<(), BridgeError> {
        error!("{}", err);
        error!("Stopping process.");
        self.publisher.bus().close().await;
        Err(err)
    }
}
