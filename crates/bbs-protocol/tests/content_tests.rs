//! Tests for the content model and RPC envelope.
//!
//! Verifies:
//! - Keys and hashes travel as hex strings
//! - Content headers are derived from, and checked against, the body
//! - Vote modes serialize as integers
//! - The `[OK]` / `[ERROR]` envelope wire form

use bbs_protocol::crypto;
use bbs_protocol::*;

fn thread() -> Content {
    Content::new(ContentBody::Thread(ThreadBody {
        of_board: PubKey([1; 32]),
        name: "welcome".into(),
        body: "say hi".into(),
        created: 1_700_000_000_000,
        creator: PubKey([2; 32]),
    }))
}

// ═══════════════════════════════════════════════════════════════
// Keys and hashes
// ═══════════════════════════════════════════════════════════════

#[test]
fn pubkey_hex_roundtrip() {
    let (pk, _) = crypto::generate_keypair();
    let parsed: PubKey = pk.to_hex().parse().unwrap();
    assert_eq!(parsed, pk);
    assert_eq!(pk.to_hex().len(), 64);
}

#[test]
fn short_hex_rejected() {
    let err = "abcd".parse::<ContentHash>().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InvalidLength {
            expected: 32,
            got: 2,
            ..
        }
    ));
    assert!(matches!(
        "zz".parse::<PubKey>(),
        Err(ProtocolError::InvalidHex(_))
    ));
}

#[test]
fn secret_key_debug_redacted() {
    let (_, sk) = crypto::generate_keypair();
    let debug = format!("{:?}", sk);
    assert!(!debug.contains(&sk.to_hex()));
}

// ═══════════════════════════════════════════════════════════════
// Content
// ═══════════════════════════════════════════════════════════════

#[test]
fn header_matches_body() {
    let content = thread();
    assert_eq!(content.kind(), ContentType::Thread);
    assert_eq!(content.hash(), &crypto::content_hash(content.body()));
    assert_eq!(content.creator(), Some(&PubKey([2; 32])));
}

#[test]
fn content_json_roundtrip_keeps_hash() {
    let content = thread();
    let json = serde_json::to_string(&content).unwrap();
    let back: Content = serde_json::from_str(&json).unwrap();
    assert_eq!(back, content);
}

#[test]
fn tampered_content_rejected() {
    let content = thread();
    let mut value = serde_json::to_value(&content).unwrap();
    value["body"]["data"]["name"] = serde_json::json!("edited");
    assert!(serde_json::from_value::<Content>(value).is_err());
}

#[test]
fn vote_mode_is_integer() {
    let vote = VoteBody {
        of_board: PubKey([1; 32]),
        target: ContentHash([3; 32]),
        mode: VoteMode::Down,
        created: 5,
        creator: PubKey([2; 32]),
    };
    let value = serde_json::to_value(&vote).unwrap();
    assert_eq!(value["mode"], serde_json::json!(-1));
    assert!(serde_json::from_str::<VoteMode>("2").is_err());
}

#[test]
fn content_type_names() {
    let names: Vec<_> = ContentType::ALL.iter().map(|t| t.as_str()).collect();
    assert_eq!(
        names,
        vec!["board", "thread", "post", "thread_vote", "post_vote", "user_vote"]
    );
    assert!(ContentType::PostVote.is_content_vote());
    assert!(!ContentType::UserVote.is_content_vote());
}

// ═══════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════

#[test]
fn envelope_decode_roundtrip() {
    let ok = Envelope::ok(&vec![1, 2, 3]).unwrap();
    let decoded = Envelope::decode(&ok.encode()).unwrap();
    assert_eq!(decoded.payload::<Vec<i32>>().unwrap(), vec![1, 2, 3]);

    let err = Envelope::error("thread not found");
    assert_eq!(Envelope::decode(&err.encode()).unwrap(), err);
}

#[test]
fn envelope_without_marker_rejected() {
    assert!(matches!(
        Envelope::decode("{}"),
        Err(ProtocolError::InvalidEnvelope(_))
    ));
}
