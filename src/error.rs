use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such directory: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build manifest: {message}")]
    Serialize { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// A hint for the user on how to recover, if there is one.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::DirectoryNotFound { .. } => Some(
                "Select the installation directory of the product and try again.".to_string(),
            ),
            Error::OutputWrite { .. } => Some(
                "Check that the output directory is writable and the file is not open elsewhere."
                    .to_string(),
            ),
            Error::Config { .. } => Some(
                "Check the settings file syntax. Run 'depmanifest config --path' to locate it."
                    .to_string(),
            ),
            Error::Serialize { .. } => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_not_found_message() {
        let error = Error::DirectoryNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert_eq!(error.to_string(), "No such directory: /no/such/dir");
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_output_write_keeps_source() {
        let error = Error::OutputWrite {
            path: PathBuf::from("/out/Third_Party_Libs.xml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.to_string().contains("Third_Party_Libs.xml"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let error = Error::from(toml_error);
        assert!(matches!(error, Error::Config { .. }));
    }
}
