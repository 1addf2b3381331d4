//! Package-level constants and metric names.

/// Current version of huddle (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "huddle";

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the connection cap was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound frames dropped as malformed (counter, labels: kind).
pub const WS_FRAMES_REJECTED_TOTAL: &str = "ws_frames_rejected_total";
/// Broadcasts performed (counter).
pub const ROOM_BROADCASTS_TOTAL: &str = "room_broadcasts_total";
/// Individual deliveries enqueued by broadcasts (counter).
pub const ROOM_DELIVERIES_TOTAL: &str = "room_deliveries_total";
/// Sessions evicted because their outbound queue was full (counter).
pub const ROOM_LAGGING_EVICTIONS_TOTAL: &str = "room_lagging_evictions_total";
/// Rooms currently present in the registry (gauge).
pub const ROOMS_ACTIVE: &str = "rooms_active";
