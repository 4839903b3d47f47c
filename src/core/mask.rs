//! Core-mask parsing (spec §6).
//!
//! ASCII hexadecimal, optionally `0x`-prefixed, interpreted as a `u64`
//! bitmask where bit `i` selects logical core `i`. Trailing non-hex
//! characters or numeric overflow are parse errors; cores the platform
//! does not enable are cleared silently afterwards.

use snafu::ResultExt;

use crate::{
    core::platform::{for_each_enabled_core, Platform},
    error::{Error, InvalidMask, MaskOverflow, MasterCoreDisabled},
};

/// Parses `text` into a `u64` mask and clears bits the platform does not
/// enable. Fails if the text is not valid hex, if it overflows 64 bits, or
/// if masking leaves the master core bit unset.
pub fn parse_and_mask(text: &str, platform: &dyn Platform) -> Result<u64, Error> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);

    // A redundant leading zero (e.g. "0x0fffffffffffffff") is valid and
    // must not be rejected just for being more than 16 hex digits long, so
    // the digit-count check ignores leading zeros rather than bailing on
    // `stripped.len()` directly.
    if stripped.trim_start_matches('0').len() > 16 {
        return MaskOverflow {
            mask: text.to_string(),
        }
        .fail();
    }

    let raw = u64::from_str_radix(stripped, 16).context(InvalidMask {
        mask: text.to_string(),
    })?;

    let mut masked = 0u64;
    for_each_enabled_core(platform, |core| {
        if raw & (1u64 << core) != 0 {
            masked |= 1u64 << core;
        }
    });

    let master = platform.master_core();
    if masked & (1u64 << master) == 0 {
        return MasterCoreDisabled {
            core: master,
            mask: masked,
        }
        .fail();
    }

    Ok(masked)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::platform::MockPlatform;

    #[test]
    fn mask_parse_with_prefix() {
        let platform = MockPlatform::new(3);
        let mask = parse_and_mask("0x6", &platform).unwrap();
        assert_eq!(mask, 0x6);
        assert_eq!(mask.count_ones(), 2);
    }

    #[test]
    fn mask_parse_master_only() {
        let platform = MockPlatform::new(3);
        let mask = parse_and_mask("0x1", &platform).unwrap();
        assert_eq!(mask, 0x1);
    }

    #[test]
    fn mask_parse_missing_master_fails() {
        let platform = MockPlatform::new(3);
        let err = parse_and_mask("0x4", &platform).unwrap_err();
        assert!(matches!(err, Error::MasterCoreDisabled { .. }));
    }

    #[test]
    fn mask_parse_rejects_trailing_garbage() {
        let platform = MockPlatform::new(3);
        let err = parse_and_mask("0x6z", &platform).unwrap_err();
        assert!(matches!(err, Error::InvalidMask { .. }));
    }

    #[test]
    fn mask_parse_rejects_overflow() {
        let platform = MockPlatform::new(3);
        let err =
            parse_and_mask("0xffffffffffffffffff", &platform).unwrap_err();
        assert!(matches!(err, Error::MaskOverflow { .. }));
    }

    #[test]
    fn mask_parse_accepts_redundant_leading_zero_past_16_digits() {
        // 17 hex digits, but the leading one is a redundant zero: the
        // actual value is u64::MAX, which does not overflow.
        let platform = MockPlatform::new(1);
        let mask = parse_and_mask("0x0ffffffffffffffff", &platform).unwrap();
        assert_eq!(mask, 0x1);
    }

    #[test]
    fn mask_parse_clears_disabled_cores_silently() {
        // only cores 0 and 1 are enabled; bit 5 is silently dropped.
        let platform = MockPlatform::new(2);
        let mask = parse_and_mask("0x23", &platform).unwrap();
        assert_eq!(mask, 0x3);
    }
}
