use url::Url;

// Only these schemes may ever be requested.
pub const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

// Only these hosts may ever be requested, spelled exactly like this (case aside).
pub const ALLOWED_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/*
Checks a URL against the allow-lists before anything touches the network.

Returns true only when the URL parses, its scheme is in ALLOWED_SCHEMES and its host is in
ALLOWED_HOSTS. A URL without a host (mailto:, data:), or one that does not parse at all,
is rejected.

Examples:
http://localhost:5000/calc/add/1/2    -> true
https://127.0.0.1/x?y=1#frag          -> true
ftp://localhost/file                  -> false (scheme)
http://example.com/                   -> false (host)
http://localhost.evil.com/            -> false (host is compared exactly)
http://2130706433/                    -> false (another spelling of 127.0.0.1)
*/
pub fn is_safe_url(url: &str) -> bool {
    parse_allowed(url).is_some()
}

/*
Parses `url` and returns it only if it passes the allow-list. The executor uses this so
the string is parsed once.

The host is checked twice: as written in the URL and as the parser understood it. Both
must be the same allowed name. The parser rewrites hosts (0x7f.0.0.1, 2130706433 and
127.1 all become 127.0.0.1, %-escapes are decoded), so a host only counts when the
caller literally wrote an allowed one.
*/
pub fn parse_allowed(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }
    let host = parsed.host_str()?;
    let written = written_host(url)?;
    if written == host && ALLOWED_HOSTS.contains(&host) {
        Some(parsed)
    } else {
        None
    }
}

// Host as it appears between "://" and the path, minus userinfo and port, lowercased.
fn written_host(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = match rest.find(['/', '?', '#']) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let host_port = match authority.rsplit_once('@') {
        Some((_, host_port)) => host_port,
        None => authority,
    };
    let host = if host_port.starts_with('[') {
        // IPv6 literal: the port, if any, follows the closing bracket.
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => host_port,
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, _)) => host,
            None => host_port,
        }
    };
    Some(host.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_urls() {
        assert!(is_safe_url("http://localhost:5000/calc/add/1/2"));
        assert!(is_safe_url("http://localhost:9090/calc/sqrt/64"));
        assert!(is_safe_url("https://127.0.0.1/"));
        assert!(is_safe_url("http://127.0.0.1:8080/a?b=c#d"));
        assert!(is_safe_url("http://localhost?x=1"));
        // Hosts are case-insensitive.
        assert!(is_safe_url("HTTP://LOCALHOST/"));
    }

    #[test]
    fn test_rejected_schemes() {
        assert!(!is_safe_url("ftp://localhost/file"));
        assert!(!is_safe_url("file:///etc/passwd"));
        assert!(!is_safe_url("ws://localhost:5000/"));
        assert!(!is_safe_url("javascript:alert(1)"));
    }

    #[test]
    fn test_rejected_hosts() {
        assert!(!is_safe_url("http://example.com/"));
        assert!(!is_safe_url("https://localhost.evil.com/"));
        assert!(!is_safe_url("http://127.0.0.2/"));
        assert!(!is_safe_url("http://[::1]:5000/"));
        assert!(!is_safe_url("http://evil.com@example.com/"));
    }

    #[test]
    fn test_rewritten_hosts_are_rejected() {
        // Each of these parses to 127.0.0.1 or localhost, but none is written as one.
        for url in [
            "http://2130706433/",
            "http://0x7f.0.0.1/",
            "http://0177.0.0.1/",
            "http://127.1:5000/",
            "http://0x7f000001/",
            "http://local%68ost/",
            "http://127.0.0.1./",
            "http://evil.com\\@localhost/",
        ] {
            assert!(!is_safe_url(url), "{} should be rejected", url);
        }
    }

    #[test]
    fn test_unparseable_or_hostless() {
        assert!(!is_safe_url(""));
        assert!(!is_safe_url("localhost:5000/calc"));
        assert!(!is_safe_url("/calc/add/1/2"));
        assert!(!is_safe_url("mailto:someone@localhost"));
        assert!(!is_safe_url("http:localhost/"));
    }

    #[test]
    fn test_userinfo_does_not_change_host() {
        // The host here is localhost; the userinfo is just noise.
        assert!(is_safe_url("http://example.com@localhost/"));
        assert!(is_safe_url("http://user:pw@127.0.0.1:5000/"));
    }

    #[test]
    fn test_parse_allowed_keeps_the_written_host() {
        let url = parse_allowed("http://127.0.0.1:5000/calc/add/1/2").expect("allowed");
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(5000));
        assert!(parse_allowed("http://2130706433:5000/calc/add/1/2").is_none());
    }
}
