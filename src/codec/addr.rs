//! Address-list syntax used by client-facing callers (CLI, REPL) to name a
//! set of target peers. This is not a wire format — it never crosses the
//! network — but it lives in the codec module because it is, like the wire
//! codec, a small strict text grammar with its own error cases.
//!
//! Grammar: a comma-separated list of entries, each either a single IPv4
//! address or an inclusive `A-B` range of addresses. Ranges are expanded in
//! address order; the final list is de-duplicated, preserving the order in
//! which each address was first named.

use crate::error::CodecError;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Parses an address-list expression into a de-duplicated, ordered list of
/// IPv4 addresses.
pub fn parse_address_list(input: &str) -> Result<Vec<Ipv4Addr>, CodecError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for entry in input.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(CodecError::BadAddress("empty entry in address list".to_owned()));
        }
        for addr in parse_entry(entry)? {
            if seen.insert(addr) {
                out.push(addr);
            }
        }
    }

    if out.is_empty() {
        return Err(CodecError::BadAddress("empty address list".to_owned()));
    }

    Ok(out)
}

fn parse_entry(entry: &str) -> Result<Vec<Ipv4Addr>, CodecError> {
    match entry.split_once('-') {
        Some((start, end)) => {
            let start: Ipv4Addr = start
                .trim()
                .parse()
                .map_err(|_| CodecError::BadAddress(format!("invalid range start: '{}'", start)))?;
            let end: Ipv4Addr = end
                .trim()
                .parse()
                .map_err(|_| CodecError::BadAddress(format!("invalid range end: '{}'", end)))?;
            let start_n = u32::from(start);
            let end_n = u32::from(end);
            if start_n > end_n {
                return Err(CodecError::BadAddress(format!(
                    "range start {} is after end {}",
                    start, end
                )));
            }
            Ok((start_n..=end_n).map(Ipv4Addr::from).collect())
        }
        None => {
            let addr: Ipv4Addr = entry
                .parse()
                .map_err(|_| CodecError::BadAddress(format!("invalid address: '{}'", entry)))?;
            Ok(vec![addr])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_address() {
        let list = parse_address_list("192.168.1.10").unwrap();
        assert_eq!(list, vec![Ipv4Addr::new(192, 168, 1, 10)]);
    }

    #[test]
    fn inclusive_range() {
        let list = parse_address_list("192.168.1.10-192.168.1.12").unwrap();
        assert_eq!(
            list,
            vec![
                Ipv4Addr::new(192, 168, 1, 10),
                Ipv4Addr::new(192, 168, 1, 11),
                Ipv4Addr::new(192, 168, 1, 12),
            ]
        );
    }

    #[test]
    fn comma_list_deduplicates_preserving_order() {
        let list = parse_address_list("192.168.1.10,192.168.1.9-192.168.1.10,192.168.1.9").unwrap();
        assert_eq!(
            list,
            vec![Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 9)]
        );
    }

    #[test]
    fn reversed_range_is_an_error() {
        assert!(parse_address_list("192.168.1.20-192.168.1.10").is_err());
    }

    #[test]
    fn empty_entry_is_an_error() {
        assert!(parse_address_list("192.168.1.10,,192.168.1.11").is_err());
    }
}
