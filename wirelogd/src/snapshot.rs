// Peer dump parser

//! Peer snapshot parsing
//!
//! Turns the output of `wg show all dump` into [`PeerRecord`]s. The dump
//! starts each interface with a 5-field line, followed by one 9-field line
//! per peer:
//!
//! `interface  public-key  preshared-key  endpoint  allowed-ips  latest-handshake  rx  tx  keepalive`
//!
//! Only the 9-field peer lines are kept; any other line is skipped.

use crate::names::NameDirectory;
use crate::types::{PeerRecord, UNKNOWN_NAME};
use thiserror::Error;

/// Number of fields on a peer line
pub const PEER_FIELDS: usize = 9;

/// Errors raised while parsing a peer line
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// Latest handshake field is not a number
    #[error("invalid latest handshake {value:?} for peer {public_key} on {interface}")]
    Handshake {
        /// Interface of the peer line
        interface: String,
        /// Public key of the peer line
        public_key: String,
        /// Raw handshake field
        value: String,
    },
}

/// Split a dump line into fields
///
/// Dump lines are tab separated and may hold empty fields (no preshared key),
/// so tabs are split one by one. Lines without tabs fall back to runs of
/// whitespace.
pub fn split_fields(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// Parse a dump into peer records, one pass, lazily
///
/// When `names` is given, each record's display name is looked up in it;
/// otherwise every peer is named [`UNKNOWN_NAME`].
pub fn parse_snapshot<'a>(
    raw: &'a str,
    mut names: Option<&'a mut NameDirectory>,
) -> impl Iterator<Item = Result<PeerRecord, ParseError>> + 'a {
    raw.lines().filter_map(move |line| {
        let fields = split_fields(line);
        if fields.len() != PEER_FIELDS {
            return None;
        }
        Some(peer_record(&fields, names.as_deref_mut()))
    })
}

/// Build a record from the fields of one peer line
fn peer_record(
    fields: &[&str],
    names: Option<&mut NameDirectory>,
) -> Result<PeerRecord, ParseError> {
    let interface = fields[0];
    let public_key = fields[1];
    let latest_handshake = fields[5]
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::Handshake {
            interface: interface.to_string(),
            public_key: public_key.to_string(),
            value: fields[5].to_string(),
        })?;

    let display_name = match names {
        Some(directory) => directory.resolve(public_key),
        None => UNKNOWN_NAME.to_string(),
    };

    Ok(PeerRecord {
        interface: interface.to_string(),
        public_key: public_key.to_string(),
        endpoint: fields[3].to_string(),
        allowed_ips: fields[4].to_string(),
        latest_handshake,
        display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INTERFACE_LINE: &str = "wg0\tPRIVATE\tSERVERPUB\t51820\toff";

    fn parse_all(raw: &str) -> Vec<Result<PeerRecord, ParseError>> {
        parse_snapshot(raw, None).collect()
    }

    #[test]
    fn test_parse_peer_line() {
        let peers = parse_all("wg0\tmypubkey\t(none)\t203.0.113.7:51820\t10.0.0.2/32\t1700000000\t100\t200\toff\n");
        assert_eq!(peers.len(), 1);

        let peer = peers[0].as_ref().unwrap();
        assert_eq!(peer.interface, "wg0");
        assert_eq!(peer.public_key, "mypubkey");
        assert_eq!(peer.endpoint, "203.0.113.7:51820");
        assert_eq!(peer.allowed_ips, "10.0.0.2/32");
        assert_eq!(peer.latest_handshake, 1_700_000_000.0);
        assert_eq!(peer.display_name, UNKNOWN_NAME);
    }

    #[test]
    fn test_empty_preshared_key_field() {
        let peers = parse_all("wg0\tPUB\t\tEP\tIPS\t1700000000\t0\t0\t0");
        assert_eq!(peers.len(), 1);
        let peer = peers[0].as_ref().unwrap();
        assert_eq!(peer.public_key, "PUB");
        assert_eq!(peer.endpoint, "EP");
        assert_eq!(peer.allowed_ips, "IPS");
    }

    #[test]
    fn test_whitespace_separated_line() {
        let peers = parse_all("wg0 pubkey psk ep ips 1 1 1 1");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].as_ref().unwrap().endpoint, "ep");
    }

    #[test]
    fn test_interface_lines_dropped() {
        let raw = format!(
            "{}\nwg0\tPUB\t(none)\tEP\tIPS\t1\t0\t0\toff\nwg0 a b c\n\n",
            INTERFACE_LINE
        );
        let peers = parse_all(&raw);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].as_ref().unwrap().public_key, "PUB");
    }

    #[test]
    fn test_four_fields_dropped() {
        assert!(parse_all("wg0 pubkey psk ep").is_empty());
        assert!(parse_all("").is_empty());
    }

    #[test]
    fn test_never_handshaked_peer() {
        let peers = parse_all("wg1\tPUB\t(none)\t(none)\t(none)\t0\t0\t0\toff");
        let peer = peers[0].as_ref().unwrap();
        assert_eq!(peer.latest_handshake, 0.0);
        assert_eq!(peer.endpoint, "(none)");
    }

    #[test]
    fn test_non_numeric_handshake_is_error() {
        let peers = parse_all(
            "wg0\tGOOD\t(none)\tEP\tIPS\t1\t0\t0\toff\nwg0\tBAD\t(none)\tEP\tIPS\tsoon\t0\t0\toff",
        );
        assert_eq!(peers.len(), 2);
        assert!(peers[0].is_ok());
        assert_eq!(
            peers[1],
            Err(ParseError::Handshake {
                interface: "wg0".to_string(),
                public_key: "BAD".to_string(),
                value: "soon".to_string(),
            })
        );
    }

    #[test]
    fn test_names_resolved_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wggw-client-uuid-like-filename"),
            r#"{"publicKey": "mypubkey", "name": "test"}"#,
        )
        .unwrap();
        let mut names = NameDirectory::new(dir.path());

        let raw = "wg0\tmypubkey\t\tendpoint\tallowed-ips\t1\t\t\t\nwg0\tother\t\tendpoint\tallowed-ips\t1\t\t\t";
        let peers: Vec<_> = parse_snapshot(raw, Some(&mut names))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(peers[0].display_name, "test");
        assert_eq!(peers[0].public_key, "mypubkey");
        assert_eq!(peers[1].display_name, UNKNOWN_NAME);
    }
}
