/// Session settings — free-form text echoes of the last-used folder
/// and parameter fields, persisted between sessions.
///
/// Encoded with the same field primitives as the model file: four
/// length-prefixed strings in order. The strings are whatever the
/// hosting surface last held and are not validated on load.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::codec::{write_string, CodecError, Reader};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Folder of the last save/open.
    pub last_path: String,
    pub iterations_text: String,
    pub initial_text: String,
    pub epsilon_text: String,
}

impl SessionSettings {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_string(&mut out, &self.last_path);
        write_string(&mut out, &self.iterations_text);
        write_string(&mut out, &self.initial_text);
        write_string(&mut out, &self.epsilon_text);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<SessionSettings, CodecError> {
        let mut reader = Reader::new(bytes);
        Ok(SessionSettings {
            last_path: reader.read_string()?,
            iterations_text: reader.read_string()?,
            initial_text: reader.read_string()?,
            epsilon_text: reader.read_string()?,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), CodecError> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<SessionSettings, CodecError> {
        let bytes = std::fs::read(path)?;
        SessionSettings::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let settings = SessionSettings {
            last_path: "../models".to_string(),
            iterations_text: "1000".to_string(),
            initial_text: "250.5".to_string(),
            epsilon_text: "0.0001".to_string(),
        };
        let back = SessionSettings::decode(&settings.encode()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn text_fields_are_not_validated() {
        let settings = SessionSettings {
            iterations_text: "not a number".to_string(),
            ..Default::default()
        };
        let back = SessionSettings::decode(&settings.encode()).unwrap();
        assert_eq!(back.iterations_text, "not a number");
    }

    #[test]
    fn truncated_stream_is_eof() {
        let settings = SessionSettings::default();
        let bytes = settings.encode();
        assert!(matches!(
            SessionSettings::decode(&bytes[..bytes.len() - 2]),
            Err(CodecError::UnexpectedEof)
        ));
    }
}
