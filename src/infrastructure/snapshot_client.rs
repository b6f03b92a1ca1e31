// Observer-side transport: HTTP snapshots and the WebSocket change feed
use crate::application::reconciler::{ClientError, SnapshotSource};
use crate::domain::envelope::ChangeEnvelope;
use crate::domain::point::Point;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    points_url: String,
}

impl HttpSnapshotSource {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            points_url: format!("{}/api/control-points", server_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_points(&self) -> Result<Vec<Point>, ClientError> {
        let response = self
            .client
            .get(&self.points_url)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(format!("{} returned {}", self.points_url, status)));
        }

        response
            .json::<Vec<Point>>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Decode one feed frame. Frames that are not change envelopes (for
/// example an `{"error": ..}` reply) yield `None`.
pub fn decode_frame(text: &str) -> Option<ChangeEnvelope> {
    match serde_json::from_str::<ChangeEnvelope>(text) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::debug!("Ignoring feed frame: {}", e);
            None
        }
    }
}

/// Connect to the change feed. The returned stream ends after yielding an
/// error once the connection drops.
pub async fn subscribe(
    ws_url: &str,
) -> Result<impl Stream<Item = Result<ChangeEnvelope, ClientError>>, ClientError> {
    let (mut ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    tracing::info!(url = %ws_url, "Connected to change feed");

    Ok(async_stream::stream! {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(envelope) = decode_frame(&text) {
                        yield Ok(envelope);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    yield Err(ClientError::Connect(e.to_string()));
                    return;
                }
            }
        }
        yield Err(ClientError::Closed);
    })
}
