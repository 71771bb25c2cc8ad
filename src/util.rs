use crate::constants::LABEL_CAPACITY;

/// Parse the leading integer of `bytes` the way C's `atol` does: optional
/// leading whitespace, an optional sign, then digits up to the first
/// non-digit. Input with no digits yields 0. Out-of-range values saturate.
pub fn lenient_parse_int(bytes: &[u8]) -> i32 {
    let mut rest = bytes;
    while let Some((first, tail)) = rest.split_first() {
        if first.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }

    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for digit in rest.iter().take_while(|b| b.is_ascii_digit()) {
        value = (value * 10 + i64::from(digit - b'0')).min(i64::from(i32::MAX) + 1);
    }
    if negative {
        value = -value;
    }

    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Cut `bytes` down to what fits in the label buffer: everything up to the
/// first NUL, at most `LABEL_CAPACITY - 1` bytes.
pub fn truncate_label(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(bytes.len())
        .min(LABEL_CAPACITY - 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers() {
        assert_eq!(lenient_parse_int(b"9600"), 9600);
        assert_eq!(lenient_parse_int(b"  115200"), 115200);
        assert_eq!(lenient_parse_int(b"+7"), 7);
        assert_eq!(lenient_parse_int(b"-2"), -2);
    }

    #[test]
    fn stops_at_first_non_digit() {
        assert_eq!(lenient_parse_int(b"19200baud"), 19200);
        assert_eq!(lenient_parse_int(b"8 bits"), 8);
    }

    #[test]
    fn garbage_becomes_zero() {
        assert_eq!(lenient_parse_int(b"abc"), 0);
        assert_eq!(lenient_parse_int(b""), 0);
        assert_eq!(lenient_parse_int(b"-"), 0);
        assert_eq!(lenient_parse_int(b"x12"), 0);
    }

    #[test]
    fn saturates_on_overflow() {
        assert_eq!(lenient_parse_int(b"99999999999999"), i32::MAX);
        assert_eq!(lenient_parse_int(b"-99999999999999"), i32::MIN);
        assert_eq!(lenient_parse_int(b"-2147483648"), i32::MIN);
    }

    #[test]
    fn label_is_truncated_to_capacity() {
        let long = [b'a'; 100];
        assert_eq!(truncate_label(&long).len(), LABEL_CAPACITY - 1);
        assert_eq!(truncate_label(b"Bridge-1"), b"Bridge-1");
    }

    #[test]
    fn label_stops_at_nul() {
        assert_eq!(truncate_label(b"abc\0def"), b"abc");
    }
}
