//! Volume naming: `<base>-<nnnnnn>.bar`, zero-padded to 6 digits. The
//! reader locates a fragment's successor volume purely from this
//! pattern, without consulting the index store.

pub fn volume_name(base: &str, volume_number: u32) -> String {
    format!("{base}-{volume_number:06}.bar")
}

/// Split a volume name back into its base and number, the inverse of
/// [`volume_name`]. Returns `None` for names that don't match the
/// pattern (e.g. a base name that itself contains no `-NNNNNN.bar`
/// suffix).
pub fn parse_volume_name(name: &str) -> Option<(&str, u32)> {
    let stripped = name.strip_suffix(".bar")?;
    let (base, digits) = stripped.rsplit_once('-')?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    Some((base, number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_name_zero_pads_to_six_digits() {
        assert_eq!(volume_name("nightly-job", 1), "nightly-job-000001.bar");
        assert_eq!(volume_name("nightly-job", 123456), "nightly-job-123456.bar");
    }

    #[test]
    fn parse_volume_name_round_trips() {
        let name = volume_name("nightly-job", 42);
        assert_eq!(parse_volume_name(&name), Some(("nightly-job", 42)));
    }

    #[test]
    fn parse_volume_name_rejects_non_matching_names() {
        assert_eq!(parse_volume_name("not-a-volume"), None);
        assert_eq!(parse_volume_name("job-1.bar"), None);
    }
}
