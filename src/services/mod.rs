/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// HTML invitation page.
pub mod join_page;
/// Session creation, joining and lookup.
pub mod session_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Periodic eviction of idle sessions.
pub mod sweep;
/// WebSocket connection and message handling service.
pub mod websocket_service;
/// Ordered write-behind queue to the durable store.
pub mod write_behind;
