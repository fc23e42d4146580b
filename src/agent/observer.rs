use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::agent::types::{AgentError, NewTokenEvent};

const SUBSCRIBE_NEW_TOKENS: &str = r#"{"method":"subscribeNewToken"}"#;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Listens to the PumpPortal new-token stream and forwards parsed events
pub struct DiscoveryFeed {
    url: String,
    mint_suffix: Option<String>,
    events: mpsc::UnboundedSender<NewTokenEvent>,
}

impl DiscoveryFeed {
    pub fn new(
        url: String,
        mint_suffix: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<NewTokenEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { url, mint_suffix, events }, receiver)
    }

    /// Stream until the receiving side goes away, reconnecting with capped
    /// exponential backoff whenever the socket drops.
    pub async fn run(&self) {
        let mut attempt: u32 = 0;
        info!("Starting discovery feed on {}", self.url);

        loop {
            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("Discovery feed connection closed");
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    error!("Discovery feed error (attempt {}): {}", attempt, e);
                }
            }

            if self.events.is_closed() {
                info!("Discovery consumer gone, stopping feed");
                return;
            }

            let delay = reconnect_delay(attempt);
            info!("Reconnecting discovery feed in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&self) -> Result<(), AgentError> {
        let (stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| AgentError::Feed("connect timed out".to_string()))?
            .map_err(|e| AgentError::Feed(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        write
            .send(Message::Text(SUBSCRIBE_NEW_TOKENS.to_string()))
            .await
            .map_err(|e| AgentError::Feed(format!("subscribe failed: {}", e)))?;
        info!("Subscribed to new token events");

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Some(event) = parse_event(&text) else {
                        debug!("Ignoring feed frame: {}", text.chars().take(200).collect::<String>());
                        continue;
                    };
                    if !self.accepts(&event) {
                        continue;
                    }
                    if self.events.send(event).is_err() {
                        return Ok(());
                    }
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        warn!("Failed to answer ping: {}", e);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => return Err(AgentError::Feed(e.to_string())),
            }
        }

        Ok(())
    }

    fn accepts(&self, event: &NewTokenEvent) -> bool {
        match &self.mint_suffix {
            Some(suffix) => event.mint.ends_with(suffix.as_str()),
            None => true,
        }
    }
}

/// Parse a feed frame. Frames without a mint (subscription acks, errors) are
/// not events.
pub fn parse_event(text: &str) -> Option<NewTokenEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("mint")?;
    serde_json::from_value(value).ok()
}

fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(6));
    (BASE_RECONNECT_DELAY * factor).min(MAX_RECONNECT_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_token_frame() {
        let frame = r#"{"signature":"sig","mint":"AbcPump","traderPublicKey":"x","txType":"create",
            "initialBuy":1000,"bondingCurveKey":"Curve111","vTokensInBondingCurve":1.0,
            "vSolInBondingCurve":30.0,"marketCapSol":28.5,"name":"Doge","symbol":"DG"}"#;
        let event = parse_event(frame).unwrap();
        assert_eq!(event.mint, "AbcPump");
        assert_eq!(event.bonding_curve_key, "Curve111");
        assert_eq!(event.market_cap_sol, 28.5);
        assert_eq!(event.name.as_deref(), Some("Doge"));
    }

    #[test]
    fn ignores_acknowledgements_and_garbage() {
        assert!(parse_event(r#"{"message":"Successfully subscribed to token creation events."}"#).is_none());
        assert!(parse_event("not json").is_none());
    }

    #[test]
    fn suffix_filter() {
        let (feed, _rx) = DiscoveryFeed::new("wss://example".into(), Some("pump".into()));
        let mut event = NewTokenEvent { mint: "xyzpump".into(), ..NewTokenEvent::default() };
        assert!(feed.accepts(&event));
        event.mint = "xyzbonk".into();
        assert!(!feed.accepts(&event));

        let (open, _rx) = DiscoveryFeed::new("wss://example".into(), None);
        assert!(open.accepts(&event));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(3), Duration::from_secs(8));
        assert_eq!(reconnect_delay(20), MAX_RECONNECT_DELAY);
    }
}
