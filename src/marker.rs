//! Service marker selection
//!
//! Live tests are tagged with a service name and only run when that service
//! is listed in `E2E_SERVICES` (comma separated; `all` or `*` selects every
//! service). Unset means nothing live runs.

/// Comma separated list of selected services
pub const ENV_SERVICES: &str = "E2E_SERVICES";

/// Whether tests marked `service` should run in this process
#[must_use]
pub fn service_selected(service: &str) -> bool {
    std::env::var(ENV_SERVICES)
        .map(|list| services_match(&list, service))
        .unwrap_or(false)
}

/// Whether the comma separated `list` selects `service`
#[must_use]
pub fn services_match(list: &str, service: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|s| s == "all" || s == "*" || s.eq_ignore_ascii_case(service))
}
