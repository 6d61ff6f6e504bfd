use crate::error::TransportError;
use async_trait::async_trait;
use futures::{ future, Sink, SinkExt, Stream, StreamExt };
use log::{ debug, info, warn };
use std::pin::Pin;
use tokio_tungstenite::{ connect_async, tungstenite::protocol::Message };
use url::Url;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Both halves of one open connection. Text in, text out.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections for the manager. The manager is the only caller.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &Url) -> Result<Link, TransportError>;
}

pub fn parse_endpoint(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw.trim()).map_err(|e|
        TransportError::InvalidEndpoint(raw.to_string(), e)
    )?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, endpoint: &Url) -> Result<Link, TransportError> {
        let (websocket, response) = connect_async(endpoint.as_str()).await?;
        info!("WebSocket handshake with {} completed ({})", endpoint, response.status());

        let (tx, rx) = websocket.split();
        let sink = tx.with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));
        let stream = rx.filter_map(|msg| future::ready(inbound_text(msg)));

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn inbound_text(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>
) -> Option<Result<String, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) =>
            match String::from_utf8(bytes) {
                Ok(text) => Some(Ok(text)),
                Err(_) => {
                    warn!("Ignoring binary frame that is not valid UTF-8");
                    None
                }
            }
        Ok(Message::Close(frame)) => {
            info!("Received close frame: {:?}", frame);
            None
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
            debug!("Control frame handled by transport");
            None
        }
        Err(e) => Some(Err(TransportError::from(e))),
    }
}
