/// Parse a byte count such as `150G`, `512MiB` or `1048576`. Suffixes are
/// binary multiples.
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let s = raw.trim().to_uppercase();
    let s = s.strip_suffix("IB").or_else(|| s.strip_suffix('B')).unwrap_or(&s);
    let (num, shift) = match s.chars().last() {
        Some('K') => (&s[..s.len() - 1], 10),
        Some('M') => (&s[..s.len() - 1], 20),
        Some('G') => (&s[..s.len() - 1], 30),
        Some('T') => (&s[..s.len() - 1], 40),
        _ => (s, 0),
    };
    let v: u64 = num.trim().parse().map_err(|_| format!("bad size {raw:?}"))?;
    if v == 0 {
        return Err(format!("size must be positive: {raw:?}"));
    }
    v.checked_mul(1u64 << shift).ok_or_else(|| format!("size too large: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::parse_size;

    #[test]
    fn parses_suffixes() {
        assert_eq!(parse_size("150G").unwrap(), 150 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("512MiB").unwrap(), 512 << 20);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("2TB").unwrap(), 2 << 40);
        assert_eq!(parse_size("1000").unwrap(), 1000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("12Q").is_err());
        assert!(parse_size("0G").is_err());
        assert!(parse_size("99999999999T").is_err());
    }
}
