use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Response error:\nStatusCode: {0}\nText: {1}")]
    Response(reqwest::StatusCode, String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to deserialize gateway event: {0}")]
    Deserialize(String),

    #[error("Gateway connection closed")]
    ConnectionClosed,
}
