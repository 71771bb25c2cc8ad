use serialport::{DataBits, Parity, StopBits};

const PARITY_MASK: u8 = 0b0000_0011;
const DATA_BITS_SHIFT: u8 = 2;
const DATA_BITS_MASK: u8 = 0b0000_1100;
const STOP_BITS_SHIFT: u8 = 4;
const STOP_BITS_MASK: u8 = 0b0011_0000;

/// Packed UART configuration word: bits 5-4 stop, 3-2 data, 1-0 parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialConfig(u8);

impl SerialConfig {
    /// Build the configuration word. Baudrate and label never take part.
    pub fn encode(parity: u8, wordlength: i32, stopbits: i32) -> Self {
        let wl: u8 = if (5..=8).contains(&wordlength) {
            (wordlength - 5) as u8
        } else {
            3
        };
        let stp: u8 = match stopbits {
            1 => 1,
            2 => 3,
            _ => 0,
        };
        let p: u8 = match parity {
            b'E' => 2,
            b'O' => 3,
            _ => 0,
        };

        SerialConfig(p | (stp << STOP_BITS_SHIFT) | (wl << DATA_BITS_SHIFT))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn data_bits(self) -> DataBits {
        match (self.0 & DATA_BITS_MASK) >> DATA_BITS_SHIFT {
            0 => DataBits::Five,
            1 => DataBits::Six,
            2 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    pub fn parity(self) -> Parity {
        match self.0 & PARITY_MASK {
            2 => Parity::Even,
            3 => Parity::Odd,
            _ => Parity::None,
        }
    }

    /// The host driver has no "unset" stop field, so 0 opens with one stop bit.
    pub fn stop_bits(self) -> StopBits {
        match (self.0 & STOP_BITS_MASK) >> STOP_BITS_SHIFT {
            3 => StopBits::Two,
            _ => StopBits::One,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_8n1() {
        assert_eq!(SerialConfig::encode(b'N', 8, 1).bits(), 0x16);
    }

    #[test]
    fn encodes_7e2() {
        assert_eq!(SerialConfig::encode(b'E', 7, 2).bits(), 58);
    }

    #[test]
    fn encodes_5o1() {
        assert_eq!(SerialConfig::encode(b'O', 5, 1).bits(), 3 | (1 << 4));
    }

    #[test]
    fn out_of_domain_values_snap() {
        // wordlength snaps to 8, stopbits to unset, parity to none
        assert_eq!(SerialConfig::encode(b'X', 9, 3).bits(), 3 << 2);
        assert_eq!(SerialConfig::encode(b'n', 4, 0).bits(), 3 << 2);
        assert_eq!(SerialConfig::encode(b'N', 8, -1).bits(), 3 << 2);
    }

    #[test]
    fn decodes_to_driver_settings() {
        let config = SerialConfig::encode(b'E', 7, 2);
        assert!(matches!(config.data_bits(), DataBits::Seven));
        assert!(matches!(config.parity(), Parity::Even));
        assert!(matches!(config.stop_bits(), StopBits::Two));

        let config = SerialConfig::encode(b'O', 6, 1);
        assert!(matches!(config.data_bits(), DataBits::Six));
        assert!(matches!(config.parity(), Parity::Odd));
        assert!(matches!(config.stop_bits(), StopBits::One));
    }

    #[test]
    fn unset_stop_field_opens_with_one_stop_bit() {
        let config = SerialConfig::encode(b'N', 8, 0);
        assert!(matches!(config.stop_bits(), StopBits::One));
    }
}
