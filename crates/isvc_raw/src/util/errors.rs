use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::JsonSerializationError(_) => "jsonserializationerror".to_string(),
            Error::KubeError(kube::Error::Api(api_err)) => format!("kubeerror_{}", api_err.code),
            Error::KubeError(_) => "kubeerror".to_string(),
            Error::MetadataMissing(_) => "metadatamissing".to_string(),
            Error::InvalidArgument(_) => "invalidargument".to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
