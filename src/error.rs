use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Browser connection failed: {message}")]
    Browser { message: String },

    #[error("Page operation failed: {message}")]
    Page { message: String },

    #[error("Element not found on page: {path}")]
    ElementNotFound { path: String },

    #[error("Invalid DevTools endpoint: {endpoint}")]
    InvalidEndpoint { endpoint: String },

    #[error("Fixture error: {message}")]
    Fixture { message: String },

    #[error("No items found on page {page}")]
    NoItemsFound { page: usize },

    #[error("Snapshot storage failed: {message}")]
    Snapshot { message: String },

    #[error("Export failed: {message}")]
    Export { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

impl HarvestError {
    /// Item-level failures are counted and the run goes on; these are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Cancelled | HarvestError::Browser { .. } | HarvestError::Snapshot { .. }
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for HarvestError {
    fn user_message(&self) -> String {
        match self {
            HarvestError::Config { message } => format!("Configuration error: {}", message),
            HarvestError::Browser { message } => {
                format!("Could not talk to the browser: {}", message)
            }
            HarvestError::Page { message } => format!("Page operation failed: {}", message),
            HarvestError::ElementNotFound { path } => {
                format!("The page changed before the element could be used: {}", path)
            }
            HarvestError::InvalidEndpoint { endpoint } => {
                format!("Invalid DevTools endpoint: {}", endpoint)
            }
            HarvestError::Fixture { message } => format!("Fixture could not be loaded: {}", message),
            HarvestError::NoItemsFound { page } => {
                format!("No students were found in the list on page {}", page)
            }
            HarvestError::Snapshot { message } => {
                format!("Progress snapshot could not be saved: {}", message)
            }
            HarvestError::Export { message } => format!("Export failed: {}", message),
            HarvestError::Cancelled => "Extraction was cancelled by user".to_string(),
            HarvestError::Io(e) => format!("IO operation failed: {}", e),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            HarvestError::Browser { .. } | HarvestError::InvalidEndpoint { .. } => Some(
                "Start Chrome with --remote-debugging-port=9222, log into SED, open the class list and pass --browser http://127.0.0.1:9222".to_string()
            ),
            HarvestError::NoItemsFound { .. } => Some(
                "Make sure the class list is open and filtered before starting, or adjust [list] in the configuration file.".to_string()
            ),
            HarvestError::Config { .. } => Some(
                "Check your configuration file syntax, or regenerate one with `sed-harvest init-config`.".to_string()
            ),
            HarvestError::Snapshot { .. } | HarvestError::Export { .. } => Some(
                "Ensure the output directory exists and is writable.".to_string()
            ),
            HarvestError::Fixture { .. } => Some(
                "A fixture directory needs an index.html plus one .html file per state referenced by data-goto.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<url::ParseError> for HarvestError {
    fn from(error: url::ParseError) -> Self {
        HarvestError::InvalidEndpoint {
            endpoint: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarvestError {
    fn from(error: toml::de::Error) -> Self {
        HarvestError::Config {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(error: serde_json::Error) -> Self {
        HarvestError::Snapshot {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = HarvestError::NoItemsFound { page: 1 };
        assert!(error.user_message().contains("page 1"));
        assert!(error.suggestion().is_some());

        let error = HarvestError::Cancelled;
        assert!(error.suggestion().is_none());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(HarvestError::Cancelled.is_fatal());
        assert!(HarvestError::Browser { message: "gone".into() }.is_fatal());
        assert!(!HarvestError::Page { message: "stale".into() }.is_fatal());
        assert!(!HarvestError::ElementNotFound { path: "html".into() }.is_fatal());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_error = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let error = HarvestError::from(parse_error);
        assert!(matches!(error, HarvestError::Config { .. }));
    }
}
