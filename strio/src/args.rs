//! `key=value` argument vectors for endpoint construction.
//!
//! Endpoints take their options as a vector of `key=value` (or
//! bare-key) strings. Each helper here tests a single key and reports
//! no-match as `Ok(None)`, so construction loops can fall through the
//! recognized keys and reject leftovers as invalid.

use crate::error::{Error, Result};

/// Returns the value of a `key=value` argument, if `arg` carries `key`.
pub fn check_keyval<'a>(arg: &'a str, key: &str) -> Option<&'a str> {
  let (k, v) = arg.split_once('=')?;
  if k == key { Some(v) } else { None }
}

/// Boolean argument: a bare `key` means true, `key=<bool>` is parsed.
pub fn check_keybool(arg: &str, key: &str) -> Result<Option<bool>> {
  if arg == key {
    return Ok(Some(true));
  }
  match check_keyval(arg, key) {
    Some("true") | Some("1") | Some("yes") | Some("on") => Ok(Some(true)),
    Some("false") | Some("0") | Some("no") | Some("off") => Ok(Some(false)),
    Some(_) => Err(Error::InvalidArgument),
    None => Ok(None),
  }
}

/// Data-size argument (a plain byte count).
pub fn check_keyds(arg: &str, key: &str) -> Result<Option<usize>> {
  match check_keyval(arg, key) {
    Some(v) => v.parse().map(Some).map_err(|_| Error::InvalidArgument),
    None => Ok(None),
  }
}

/// Parses an unsigned integer with an auto-detected base: a `0x`
/// prefix is hexadecimal, a leading `0` is octal, anything else
/// decimal.
pub fn parse_uint_autobase(s: &str) -> Result<u64> {
  let t = s.trim();
  if t.is_empty() {
    return Err(Error::InvalidArgument);
  }
  let (digits, radix) =
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
      (hex, 16)
    } else if t.len() > 1 && t.starts_with('0') {
      (&t[1..], 8)
    } else {
      (t, 10)
    };
  u64::from_str_radix(digits, radix).map_err(|_| Error::InvalidArgument)
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn keyval_matches_only_the_exact_key() {
    assert_eq!(check_keyval("readbuf=2048", "readbuf"), Some("2048"));
    assert_eq!(check_keyval("readbufs=2048", "readbuf"), None);
    assert_eq!(check_keyval("readbuf", "readbuf"), None);
  }

  #[test]
  fn keybool_accepts_bare_key_and_spelled_values() {
    assert_eq!(check_keybool("nodelay", "nodelay").unwrap(), Some(true));
    assert_eq!(
      check_keybool("nodelay=false", "nodelay").unwrap(),
      Some(false)
    );
    assert_eq!(check_keybool("nodelay=1", "nodelay").unwrap(), Some(true));
    assert_eq!(check_keybool("laddr=x", "nodelay").unwrap(), None);
    assert!(check_keybool("nodelay=maybe", "nodelay").is_err());
  }

  #[test]
  fn autobase_handles_all_three_prefixes() {
    assert_eq!(parse_uint_autobase("0x10").unwrap(), 16);
    assert_eq!(parse_uint_autobase("010").unwrap(), 8);
    assert_eq!(parse_uint_autobase("10").unwrap(), 10);
    assert_eq!(parse_uint_autobase("0").unwrap(), 0);
    assert!(parse_uint_autobase("").is_err());
    assert!(parse_uint_autobase("0xzz").is_err());
    assert!(parse_uint_autobase("-1").is_err());
  }

  proptest! {
    #[test]
    fn autobase_roundtrips_decimal(n in 1u64..u64::MAX / 2) {
      prop_assert_eq!(parse_uint_autobase(&n.to_string()).unwrap(), n);
    }

    #[test]
    fn keyds_roundtrips(n in 0usize..1 << 30) {
      let arg = format!("readbuf={n}");
      prop_assert_eq!(check_keyds(&arg, "readbuf").unwrap(), Some(n));
    }
  }
}
