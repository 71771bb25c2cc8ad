use std::fmt;

use crate::codec::SerialConfig;
use crate::constants::MIN_PLAUSIBLE_BAUDRATE;
use crate::util::truncate_label;

/// Free-form device label, stored as raw bytes so whatever the control
/// channel sent is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Label(Vec<u8>);

impl Label {
    /// Builds a label, silently dropping anything past the buffer capacity.
    pub fn new(bytes: &[u8]) -> Self {
        Label(truncate_label(bytes).to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Serial line parameters. Values are kept as given; out-of-domain values
/// are only interpreted by [`SerialConfig::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub label: Label,
    pub baudrate: i32,
    pub parity: u8,
    pub wordlength: i32,
    pub stopbits: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            label: Label::new(b"Undefined"),
            baudrate: 9600,
            parity: b'N',
            wordlength: 8,
            stopbits: 1,
        }
    }
}

impl Settings {
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig::encode(self.parity, self.wordlength, self.stopbits)
    }

    /// Whether a freshly loaded record looks programmed at all
    pub fn is_plausible(&self) -> bool {
        self.baudrate >= MIN_PLAUSIBLE_BAUDRATE
    }

    /// `label,baudrate,parity,wordlength,stopbits` without a line ending
    pub fn to_csv(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.label.as_bytes().len() + 24);
        out.extend_from_slice(self.label.as_bytes());
        out.extend_from_slice(format!(",{},", self.baudrate).as_bytes());
        out.push(self.parity);
        out.extend_from_slice(format!(",{},{}", self.wordlength, self.stopbits).as_bytes());
        out
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "label={} baudrate={} parity={} wordlength={} stopbits={}",
            self.label,
            self.baudrate,
            char::from(self.parity),
            self.wordlength,
            self.stopbits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_as_csv() {
        assert_eq!(Settings::default().to_csv(), b"Undefined,9600,N,8,1".to_vec());
    }

    #[test]
    fn defaults_are_plausible() {
        assert!(Settings::default().is_plausible());
        let settings = Settings {
            baudrate: 299,
            ..Settings::default()
        };
        assert!(!settings.is_plausible());
    }

    #[test]
    fn csv_keeps_raw_parity_byte() {
        let settings = Settings {
            parity: b'x',
            ..Settings::default()
        };
        assert_eq!(settings.to_csv(), b"Undefined,9600,x,8,1".to_vec());
    }

    #[test]
    fn config_ignores_label_and_baudrate() {
        let a = Settings::default();
        let b = Settings {
            label: Label::new(b"other"),
            baudrate: 115200,
            ..Settings::default()
        };
        assert_eq!(a.serial_config(), b.serial_config());
    }
}
