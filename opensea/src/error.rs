use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to deserialize response: {0}")]
    Deserialize(String),

    #[error("Response was empty: {0}")]
    UnexpectedPayload(String),
}
