//! Audit trail primitives.
//!
//! Every lifecycle mutation appends one audit entry. Entries carry an
//! integrity hash chained over the previous entry's hash, so a tampered or
//! deleted row breaks every hash after it. The chain is per recorrido; the
//! first entry chains over [`CHAIN_SEED`].

use crate::hashing::sha256_hex;

/// Seed for the first entry of each recorrido's chain.
pub const CHAIN_SEED: &str = "recorrido-audit-v1";

/// Lifecycle actions recorded in the audit log.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const UPDATE_DRAFT: &str = "update_draft";
    pub const SAVE_CANVAS: &str = "save_canvas";
    pub const VALIDATE_DRAFT: &str = "validate_draft";
    pub const PUBLISH: &str = "publish";
    pub const DUPLICATE: &str = "duplicate";
    pub const SET_STATUS: &str = "set_status";
    pub const SOFT_DELETE: &str = "soft_delete";
    pub const RESTORE: &str = "restore";

    pub const ALL: &[&str] = &[
        CREATE,
        UPDATE_DRAFT,
        SAVE_CANVAS,
        VALIDATE_DRAFT,
        PUBLISH,
        DUPLICATE,
        SET_STATUS,
        SOFT_DELETE,
        RESTORE,
    ];
}

/// Compute the integrity hash for one audit entry.
///
/// `prev_hash` is the previous entry's hash for the same recorrido, or
/// `None` for the first entry. Fields are length-prefixed before hashing so
/// no two field sequences collide by concatenation.
pub fn chain_hash(
    prev_hash: Option<&str>,
    recorrido_id: &str,
    action: &str,
    actor: &str,
    detail: &serde_json::Value,
) -> String {
    let detail_json = detail.to_string();
    let mut payload = String::new();
    for field in [
        prev_hash.unwrap_or(CHAIN_SEED),
        recorrido_id,
        action,
        actor,
        &detail_json,
    ] {
        payload.push_str(&field.len().to_string());
        payload.push(':');
        payload.push_str(field);
    }
    sha256_hex(payload.as_bytes())
}

/// Verify a chain of `(recorrido_id, action, actor, detail, hash)` entries
/// in insertion order. Returns the index of the first broken entry, if any.
pub fn first_broken_link(
    entries: &[(String, String, String, serde_json::Value, String)],
) -> Option<usize> {
    let mut prev: Option<&str> = None;
    for (i, (recorrido_id, action, actor, detail, hash)) in entries.iter().enumerate() {
        let expected = chain_hash(prev, recorrido_id, action, actor, detail);
        if expected != *hash {
            return Some(i);
        }
        prev = Some(hash);
    }
    None
}
