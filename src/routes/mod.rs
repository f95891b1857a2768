/// Router Module Index
///
/// Groups the routes by the access class the edge gate assigns them. The gate itself is a
/// single layer applied over the assembled router in `create_router`; the split here keeps the
/// leaf extractors (`AuthUser`, `AdminUser`) next to the routes that rely on them.

/// Routes open to everyone, plus the anonymous-only sign-in flow under `/auth`.
pub mod public;

/// Routes that require a resolved session (`/journal`, `/profile`).
pub mod authenticated;

/// Routes nested under `/admin`. Everything except `/admin/login` requires an admin role.
pub mod admin;
