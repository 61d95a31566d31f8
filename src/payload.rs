use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::PayloadLimits;
use crate::error::RelayError;

const DATA_URL_SCHEME: &str = "data:";

/// Drops a `data:<mime>;base64,` prefix, if there is one.
pub fn strip_data_url(data: &str) -> &str {
    if !data.starts_with(DATA_URL_SCHEME) {
        return data;
    }
    match data.find(',') {
        Some(idx) => &data[idx + 1..],
        None => data,
    }
}

/// Decoded size implied by an encoded length: `floor(len * 3 / 4)`.
pub fn estimated_decoded_len(encoded_len: usize) -> usize {
    encoded_len.saturating_mul(3) / 4
}

/// Two-stage ceiling: the encoded text first, so oversized input is never
/// decoded, then the decoded size it implies.
pub fn check_size(encoded: &str, limits: &PayloadLimits) -> Result<(), RelayError> {
    if encoded.len() > limits.max_encoded_bytes {
        return Err(RelayError::ImageTooLarge);
    }
    if estimated_decoded_len(encoded.len()) > limits.max_decoded_bytes {
        return Err(RelayError::ImageTooLarge);
    }
    Ok(())
}

pub fn decode_image(encoded: &str) -> Result<Vec<u8>, RelayError> {
    STANDARD
        .decode(encoded)
        .map_err(|_| RelayError::InvalidBase64)
}

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_stripped() {
        let with_prefix = strip_data_url("data:image/png;base64,AAAA");
        assert_eq!(with_prefix, "AAAA");
        assert_eq!(
            decode_image(with_prefix).unwrap(),
            decode_image(strip_data_url("AAAA")).unwrap()
        );
    }

    #[test]
    fn only_first_comma_is_consumed() {
        assert_eq!(strip_data_url("data:a,b,c"), "b,c");
    }

    #[test]
    fn without_scheme_or_comma_data_is_untouched() {
        assert_eq!(strip_data_url("AAAA,BBBB"), "AAAA,BBBB");
        assert_eq!(strip_data_url("data:AAAA"), "data:AAAA");
    }

    #[test]
    fn estimate_floors() {
        assert_eq!(estimated_decoded_len(4), 3);
        assert_eq!(estimated_decoded_len(5), 3);
        assert_eq!(estimated_decoded_len(0), 0);
    }

    #[test]
    fn encoded_ceiling_is_checked_first() {
        let limits = PayloadLimits::default();
        let oversized = "A".repeat(6 * 1024 * 1024 + 4);
        assert!(matches!(
            check_size(&oversized, &limits),
            Err(RelayError::ImageTooLarge)
        ));
        let at_limit = "A".repeat(6 * 1024 * 1024);
        assert!(check_size(&at_limit, &limits).is_ok());
    }

    #[test]
    fn decoded_estimate_over_ceiling_is_rejected() {
        // encoded ceiling loose enough that only the decoded estimate trips
        let limits = PayloadLimits {
            max_encoded_bytes: 8 * 1024 * 1024,
            max_decoded_bytes: 5 * 1024 * 1024,
        };
        let encoded = "AAAA".repeat(5 * 1024 * 1024 / 3 + 1);
        assert!(estimated_decoded_len(encoded.len()) > 5 * 1024 * 1024);
        assert!(matches!(
            check_size(&encoded, &limits),
            Err(RelayError::ImageTooLarge)
        ));
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(matches!(decode_image("not base64!"), Err(RelayError::InvalidBase64)));
        assert!(matches!(decode_image("AAA"), Err(RelayError::InvalidBase64)));
    }

    #[test]
    fn recognises_png_signature() {
        let bytes = decode_image(crate::test_support::TINY_PNG).unwrap();
        assert!(is_png(&bytes));
        assert!(!is_png(&[0, 0, 0]));
    }
}
