use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Could not initialize gateway client: {0}")]
    Initialization(String),
    #[error("Gateway rejected credentials: {0}")]
    Auth(String),
    #[error("Notification channel registration failed. Error {status}. {message}")]
    Registration { status: u16, message: String },
    #[error("Order submission rejected. Error {status}. {message}")]
    Submission { status: u16, message: String },
    #[error("Gateway request failed: {0}")]
    Transport(String),
    #[error("Could not deserialize gateway response: {0}")]
    Json(String),
}
