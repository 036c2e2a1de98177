/// Router Module Index
///
/// Splits the API by access level. Access control is applied per module through an
/// Axum layer in `create_router`, so a handler can't end up public by accident.

/// Routes open to anonymous clients: health and the account endpoints.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Requires a valid session cookie or bearer token.
pub mod authenticated;
