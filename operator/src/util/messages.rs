/// Written to the ResultSecret's `error` key when no `PlatformConfig` entry
/// exists at all for the task's requested platform.
pub fn no_config_for_platform(platform: &str) -> String {
    format!("no host pool or dynamic pool is configured for platform '{platform}'")
}

/// Written when every host matching the platform is present in `FailedHosts`.
pub fn hosts_exhausted(platform: &str, attempted: &[String]) -> String {
    format!(
        "no available host for platform '{platform}' (attempted: {})",
        attempted.join(", ")
    )
}

/// Written when a provisioning AuxTask reports success but left no
/// ResultSecret behind.
pub const PROVISION_SUCCEEDED_NO_SECRET: &str =
    "provision task succeeded but no secret was created";
