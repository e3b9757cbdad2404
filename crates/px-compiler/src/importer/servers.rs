//! Proxy server subscription lists.
//!
//! One server per line, either `host:port` (using the subscription's
//! protocol) or `scheme://[user:pass@]host:port[#name]`.

use px_core::types::{ProxyProtocol, ProxyServer};

pub fn parse(text: &str, subscription_id: &str, default_protocol: ProxyProtocol) -> Vec<ProxyServer> {
    let mut servers = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        match parse_line(line, default_protocol) {
            Some(mut server) => {
                server.id = format!("{subscription_id}:{}:{}", server.host, server.port);
                if server.name.is_empty() {
                    server.name = format!("{}:{}", server.host, server.port);
                }
                if let Err(e) = server.validate() {
                    log::debug!("skipping server line '{line}': {e}");
                    continue;
                }
                servers.push(server);
            }
            None => log::debug!("skipping server line '{line}'"),
        }
    }

    servers
}

fn parse_line(line: &str, default_protocol: ProxyProtocol) -> Option<ProxyServer> {
    let (line, name) = match line.split_once('#') {
        Some((line, name)) => (line.trim(), name.trim().to_string()),
        None => (line, String::new()),
    };

    let (protocol, rest) = match line.split_once("://") {
        Some((scheme, rest)) => (protocol_for_scheme(scheme)?, rest),
        None => (default_protocol, line),
    };

    let (credentials, address) = match rest.rsplit_once('@') {
        Some((credentials, address)) => (Some(credentials), address),
        None => (None, rest),
    };
    let address = address.trim_end_matches('/');

    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;

    let (username, password) = match credentials.map(|c| c.split_once(':')) {
        Some(Some((user, pass))) => (Some(user.to_string()), Some(pass.to_string())),
        Some(None) => (credentials.map(str::to_string), None),
        None => (None, None),
    };

    Some(ProxyServer {
        id: String::new(),
        name,
        host: host.to_string(),
        port,
        protocol,
        username,
        password,
        proxy_dns: false,
    })
}

fn protocol_for_scheme(scheme: &str) -> Option<ProxyProtocol> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" => Some(ProxyProtocol::Http),
        "https" => Some(ProxyProtocol::Https),
        "socks4" | "socks" => Some(ProxyProtocol::Socks4),
        "socks5" | "socks5h" => Some(ProxyProtocol::Socks5),
        _ => None,
    }
}
