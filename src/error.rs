use std::fmt;

#[derive(Debug)]
pub enum SportCardError {
    EmptyCardSet,
    UnplaceableFlowable(String),
    InvalidConfiguration(String),
    InvalidImage(String),
    InvalidIndex(String),
    Font(String),
    Io(std::io::Error),
}

impl fmt::Display for SportCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SportCardError::EmptyCardSet => write!(f, "no cards provided to render"),
            SportCardError::UnplaceableFlowable(message) => {
                write!(f, "flowable cannot fit on any page: {}", message)
            }
            SportCardError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            SportCardError::InvalidImage(message) => write!(f, "invalid image: {}", message),
            SportCardError::InvalidIndex(message) => write!(f, "invalid index: {}", message),
            SportCardError::Font(message) => write!(f, "font error: {}", message),
            SportCardError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for SportCardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SportCardError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SportCardError {
    fn from(value: std::io::Error) -> Self {
        SportCardError::Io(value)
    }
}
