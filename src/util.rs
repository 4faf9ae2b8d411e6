const SCOLLECTOR_HOSTNAME: &str = "SCOLLECTOR_HOSTNAME";

const SCOLLECTOR_CONFIG: &str = "SCOLLECTOR_CONFIG";

const DEFAULT_HOSTNAME: &str = "unknown";

pub fn get_hostname_override() -> Option<String> {
    std::env::var(SCOLLECTOR_HOSTNAME)
        .ok()
        .filter(|h| !h.trim().is_empty())
}

pub fn get_config_path() -> Option<String> {
    std::env::var(SCOLLECTOR_CONFIG).ok()
}

/// Lowercases and, unless `full_host` is set, strips the domain.
pub fn normalize_hostname(raw: &str, full_host: bool) -> String {
    let host = raw.trim().to_lowercase();
    if full_host {
        return host;
    }
    match host.split_once('.') {
        // an IP address has no domain to strip
        Some(_) if host.parse::<std::net::IpAddr>().is_ok() => host,
        Some((short, _)) if !short.is_empty() => short.to_string(),
        _ => host,
    }
}

/// Picks the hostname: configured value, then the environment, then the OS.
pub fn resolve_hostname(configured: Option<&str>, full_host: bool) -> String {
    let raw = configured
        .filter(|h| !h.trim().is_empty())
        .map(str::to_string)
        .or_else(get_hostname_override)
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());

    let host = normalize_hostname(&raw, full_host);
    if host.is_empty() {
        DEFAULT_HOSTNAME.to_string()
    } else {
        host
    }
}
