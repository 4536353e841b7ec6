use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid root identity: {0}")]
    InvalidRootIdentity(String),

    #[error("Missing subject identity: a leaf certificate needs a common name or at least one hostname")]
    MissingSubjectIdentity,

    #[error("Signing failure: {0}")]
    SigningFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Certificate parsing error: {0}")]
    CertParse(String),

    #[error("Certificate verification failed: {0}")]
    Verification(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "json")]
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<x509_parser::nom::Err<x509_parser::error::X509Error>> for Error {
    fn from(err: x509_parser::nom::Err<x509_parser::error::X509Error>) -> Self {
        Error::CertParse(err.to_string())
    }
}

impl From<x509_parser::nom::Err<x509_parser::error::PEMError>> for Error {
    fn from(err: x509_parser::nom::Err<x509_parser::error::PEMError>) -> Self {
        Error::CertParse(err.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Verification(err.to_string())
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
