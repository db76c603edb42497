/// CRD API-version parsing and comparison, used during CRD install/migration.
pub mod migration;

/// Liveness/readiness helpers for the `/healthz` endpoint.
pub mod health;
