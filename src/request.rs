use url::Url;

// The only method this client speaks.
const METHOD: &str = "GET";
const VERSION: &str = "HTTP/1.1";

// Identifies us in the User-Agent header.
const USER_AGENT: &str = concat!("calcprobe/", env!("CARGO_PKG_VERSION"));

/*
Builds the request target: the part of the URL that goes on the request line.

path            -> "/calc/add/1/2"
path + query    -> "/calc/add/1/2?verbose=1"
no path         -> "/"

The fragment (#...) never goes on the wire, so it is ignored. An empty query ("http://h/p?")
counts as no query.
*/
pub fn build_request_target(url: &Url) -> String {
    let path = match url.path() {
        "" => "/",
        p => p,
    };
    match url.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    }
}

// Value for the Host header. The port is only included when it is not the scheme default.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

// Serializes a complete GET request, headers and the terminating blank line included:
//
//     GET /calc/add/1/2 HTTP/1.1
//     Host: localhost:5000
//     User-Agent: calcprobe/0.1.0
//     Accept: */*
//     Accept-Encoding: identity
//     Connection: close
//
// Connection: close lets the server end the body by closing the socket. We never reuse it.
pub fn build_get_request(url: &Url) -> Vec<u8> {
    let request = format!(
        concat!(
            "{} {} {}\r\n",
            "Host: {}\r\n",
            "User-Agent: {}\r\n",
            "Accept: */*\r\n",
            "Accept-Encoding: identity\r\n",
            "Connection: close\r\n\r\n",
        ),
        METHOD,
        build_request_target(url),
        VERSION,
        host_header(url),
        USER_AGENT
    );

    return request.into_bytes();
}
