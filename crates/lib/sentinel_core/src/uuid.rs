// Helper for generating UUIDv7 (timestamp-sortable UUIDs).
//
// Every table keyed by uuid gets its id app-side, so session and user ids
// sort by creation time in both stores.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
