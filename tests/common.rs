#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiny_http::{Response, Server};

/*
Starts a stand-in calculator on an ephemeral port and returns its base URL.

It answers /calc/{add,multiply,divide}/a/b and /calc/sqrt/n the way the real API does:
200 with the decimal result, 406 for division by zero, 404 for anything else.
The server thread lives until the test binary exits.
*/
pub fn spawn_calculator(host: &str) -> String {
    let server = Server::http("127.0.0.1:0").expect("bind stand-in calculator");
    let port = server.server_addr().to_ip().expect("ip listener").port();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let (status, body) = calculate(request.url());
            let _ = request.respond(Response::from_string(body).with_status_code(status));
        }
    });

    format!("http://{}:{}", host, port)
}

fn calculate(path: &str) -> (u16, String) {
    let path = path.split('?').next().unwrap_or(path);
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let number = |s: &str| s.parse::<f64>().ok();

    match parts.as_slice() {
        ["calc", op, a, b] => match (number(*a), number(*b)) {
            (Some(a), Some(b)) => match *op {
                "add" => (200, format!("{}", a + b)),
                "multiply" => (200, format!("{}", a * b)),
                "divide" if b == 0.0 => (406, "Division by zero is not accepted".to_string()),
                "divide" => (200, format!("{}", a / b)),
                _ => (404, "Not Found".to_string()),
            },
            _ => (400, "Operands must be numbers".to_string()),
        },
        ["calc", "sqrt", n] => match number(*n) {
            Some(n) if n >= 0.0 => (200, format!("{}", n.sqrt())),
            _ => (400, "Operand must be a non-negative number".to_string()),
        },
        _ => (404, "Not Found".to_string()),
    }
}

// Reads from a raw socket until the end of the request head.
pub fn read_request<R: Read>(stream: &mut R) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/*
Accepts one connection on an ephemeral port and hands it to `peer`.
Returns the port and the peer thread, whose result the test can join on.
*/
pub fn spawn_raw_peer<T, F>(peer: F) -> (u16, JoinHandle<T>)
where
    T: Send + 'static,
    F: FnOnce(TcpStream) -> T + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind raw peer");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        peer(stream)
    });
    (port, handle)
}

/*
Serves one canned response, then waits for the client to hang up.

Returns true if the client closed its end within five seconds: read() gives EOF, or a
reset when the client dropped unread bytes. A read timeout means the socket was leaked.
*/
pub fn serve_and_wait_for_close(mut stream: TcpStream, response: &'static [u8]) -> bool {
    read_request(&mut stream);
    stream.write_all(response).expect("write canned response");
    stream.flush().expect("flush");

    stream.set_read_timeout(Some(Duration::from_secs(5))).expect("read timeout");
    let mut rest = [0u8; 64];
    match stream.read(&mut rest) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) => err.kind() == std::io::ErrorKind::ConnectionReset,
    }
}
