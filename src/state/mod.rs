mod refresh_gate;
mod session;
mod storage;

pub use refresh_gate::{GateEntry, RefreshGate, RefreshLease, RefreshOutcome, RefreshWaiter};
pub use session::Session;
pub use storage::{
    KeyringStorage, MemoryStorage, SessionStorage, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER,
    SESSION_KEYS,
};
