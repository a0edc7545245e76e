/// Capacity of the per-board change-notification queue.
pub const CHANGES_CAPACITY: usize = 10;

/// Poll interval used while waiting for a board to reach a sequence number.
pub const WAIT_SEQ_INTERVAL_SECS: u64 = 1;

/// Default interval between passes of the background sync driver.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5;

/// Default time an asynchronous request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Prefix of a successful RPC envelope.
pub const ENVELOPE_OK_PREFIX: &str = "[OK] ";

/// Prefix of a failed RPC envelope.
pub const ENVELOPE_ERROR_PREFIX: &str = "[ERROR] ";

/// View id of the board/thread/post projection.
pub const CONTENT_VIEW: &str = "content";

/// View id of the per-user follow projection.
pub const FOLLOW_VIEW: &str = "follow";

/// Default bind address of the node's RPC listener.
pub const DEFAULT_RPC_BIND_ADDR: &str = "127.0.0.1:7410";

/// Default cap on concurrent RPC connections.
pub const DEFAULT_RPC_MAX_CONNECTIONS: usize = 16;
