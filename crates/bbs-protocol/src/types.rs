use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto;
use crate::error::ProtocolError;

/// Defines a 32-byte value that travels as a lowercase hex string.
macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
                let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidHex(e.to_string()))?;
                let got = bytes.len();
                let arr: [u8; 32] = bytes.try_into().map_err(|_| ProtocolError::InvalidLength {
                    what: $what,
                    expected: 32,
                    got,
                })?;
                Ok(Self(arr))
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes!(
    /// Public key identifying a board or a user.
    PubKey,
    "public key"
);

hex_bytes!(
    /// Secret key granting write authority over a board.
    SecretKey,
    "secret key"
);

hex_bytes!(
    /// SHA-256 digest identifying an immutable content item.
    ContentHash,
    "content hash"
);

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self.to_hex())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Tag of a content item. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Board,
    Thread,
    Post,
    ThreadVote,
    PostVote,
    UserVote,
}

impl ContentType {
    /// Every registered content type; the schema handed to the object store.
    pub const ALL: [ContentType; 6] = [
        ContentType::Board,
        ContentType::Thread,
        ContentType::Post,
        ContentType::ThreadVote,
        ContentType::PostVote,
        ContentType::UserVote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Board => "board",
            ContentType::Thread => "thread",
            ContentType::Post => "post",
            ContentType::ThreadVote => "thread_vote",
            ContentType::PostVote => "post_vote",
            ContentType::UserVote => "user_vote",
        }
    }

    /// Whether this is a vote against a thread or post.
    pub fn is_content_vote(&self) -> bool {
        matches!(self, ContentType::ThreadVote | ContentType::PostVote)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a vote. `None` retracts an earlier vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteMode {
    Down,
    None,
    Up,
}

impl TryFrom<i8> for VoteMode {
    type Error = ProtocolError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteMode::Down),
            0 => Ok(VoteMode::None),
            1 => Ok(VoteMode::Up),
            other => Err(ProtocolError::InvalidVoteMode(other)),
        }
    }
}

impl From<VoteMode> for i8 {
    fn from(mode: VoteMode) -> i8 {
        match mode {
            VoteMode::Down => -1,
            VoteMode::None => 0,
            VoteMode::Up => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardBody {
    pub name: String,
    pub body: String,
    pub created: i64,
    #[serde(default)]
    pub submission_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadBody {
    pub of_board: PubKey,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostBody {
    pub of_board: PubKey,
    pub of_thread: ContentHash,
    pub name: String,
    pub body: String,
    pub created: i64,
    pub creator: PubKey,
}

/// Body shared by thread and post votes; `target` is the voted content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBody {
    pub of_board: PubKey,
    pub target: ContentHash,
    pub mode: VoteMode,
    pub created: i64,
    pub creator: PubKey,
}

/// A follow signal from `creator` about `of_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVoteBody {
    pub of_board: PubKey,
    pub of_user: PubKey,
    pub mode: VoteMode,
    #[serde(default)]
    pub tag: String,
    pub created: i64,
    pub creator: PubKey,
}

/// Typed body of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContentBody {
    Board(BoardBody),
    Thread(ThreadBody),
    Post(PostBody),
    ThreadVote(VoteBody),
    PostVote(VoteBody),
    UserVote(UserVoteBody),
}

impl ContentBody {
    pub fn kind(&self) -> ContentType {
        match self {
            ContentBody::Board(_) => ContentType::Board,
            ContentBody::Thread(_) => ContentType::Thread,
            ContentBody::Post(_) => ContentType::Post,
            ContentBody::ThreadVote(_) => ContentType::ThreadVote,
            ContentBody::PostVote(_) => ContentType::PostVote,
            ContentBody::UserVote(_) => ContentType::UserVote,
        }
    }

    /// Author of the item. Boards are owned by their key, not a creator.
    pub fn creator(&self) -> Option<&PubKey> {
        match self {
            ContentBody::Board(_) => None,
            ContentBody::Thread(b) => Some(&b.creator),
            ContentBody::Post(b) => Some(&b.creator),
            ContentBody::ThreadVote(b) | ContentBody::PostVote(b) => Some(&b.creator),
            ContentBody::UserVote(b) => Some(&b.creator),
        }
    }

    /// Board the item was submitted to. A board body is its own root.
    pub fn of_board(&self) -> Option<&PubKey> {
        match self {
            ContentBody::Board(_) => None,
            ContentBody::Thread(b) => Some(&b.of_board),
            ContentBody::Post(b) => Some(&b.of_board),
            ContentBody::ThreadVote(b) | ContentBody::PostVote(b) => Some(&b.of_board),
            ContentBody::UserVote(b) => Some(&b.of_board),
        }
    }

    pub fn created(&self) -> i64 {
        match self {
            ContentBody::Board(b) => b.created,
            ContentBody::Thread(b) => b.created,
            ContentBody::Post(b) => b.created,
            ContentBody::ThreadVote(b) | ContentBody::PostVote(b) => b.created,
            ContentBody::UserVote(b) => b.created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHeader {
    pub hash: ContentHash,
    #[serde(rename = "type")]
    pub kind: ContentType,
}

/// An immutable, content-addressed item. The header is always derived
/// from the body, so a `Content` value can never carry a stale hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawContent")]
pub struct Content {
    header: ContentHeader,
    body: ContentBody,
}

#[derive(Deserialize)]
struct RawContent {
    header: ContentHeader,
    body: ContentBody,
}

impl TryFrom<RawContent> for Content {
    type Error = ProtocolError;

    fn try_from(raw: RawContent) -> Result<Self, Self::Error> {
        let content = Content::new(raw.body);
        if content.header.kind != raw.header.kind {
            return Err(ProtocolError::TypeMismatch {
                header: raw.header.kind.to_string(),
                body: content.header.kind.to_string(),
            });
        }
        if content.header.hash != raw.header.hash {
            return Err(ProtocolError::HashMismatch {
                header: raw.header.hash.to_hex(),
                computed: content.header.hash.to_hex(),
            });
        }
        Ok(content)
    }
}

impl Content {
    pub fn new(body: ContentBody) -> Self {
        let header = ContentHeader {
            hash: crypto::content_hash(&body),
            kind: body.kind(),
        };
        Self { header, body }
    }

    pub fn header(&self) -> &ContentHeader {
        &self.header
    }

    pub fn hash(&self) -> &ContentHash {
        &self.header.hash
    }

    pub fn kind(&self) -> ContentType {
        self.header.kind
    }

    pub fn body(&self) -> &ContentBody {
        &self.body
    }

    pub fn creator(&self) -> Option<&PubKey> {
        self.body.creator()
    }

    pub fn as_board(&self) -> Option<&BoardBody> {
        match &self.body {
            ContentBody::Board(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadBody> {
        match &self.body {
            ContentBody::Thread(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&PostBody> {
        match &self.body {
            ContentBody::Post(b) => Some(b),
            _ => None,
        }
    }

    /// Thread or post vote body.
    pub fn as_vote(&self) -> Option<&VoteBody> {
        match &self.body {
            ContentBody::ThreadVote(b) | ContentBody::PostVote(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_user_vote(&self) -> Option<&UserVoteBody> {
        match &self.body {
            ContentBody::UserVote(b) => Some(b),
            _ => None,
        }
    }
}

/// Current time as unix milliseconds, the unit of every `created` field.
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
