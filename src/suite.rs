use thiserror::Error;
use tracing::{info, warn};

use crate::calc::{Expected, Operation, Service};
use crate::client::Client;
use crate::config::Config;
use crate::error::ClientError;
use crate::response::Response;
use crate::safety::is_safe_url;

// A single end-to-end expectation: GET `url` and compare with `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub operation: Operation,
    pub url: String,
    pub expected: Expected,
}

#[derive(Debug, Error)]
pub enum CheckFailure {
    #[error("URL is not safe: {url}")]
    UnsafeUrl { url: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: ClientError,
    },

    #[error("{url}: expected status {expected}, got {actual}")]
    Status { url: String, expected: u16, actual: u16 },

    #[error("{url}: expected body {expected:?}, got {actual:?}")]
    Body { url: String, expected: String, actual: String },
}

// Outcome of one check.
#[derive(Debug)]
pub struct CheckReport {
    pub name: String,
    pub url: String,
    pub result: Result<(), CheckFailure>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

impl Check {
    pub fn new(name: &str, operation: Operation, config: &Config) -> Self {
        let base = match operation.service() {
            Service::Api => &config.base_url,
            Service::Mock => &config.mock_base_url,
        };
        Check {
            name: name.to_string(),
            operation,
            url: operation.url(base),
            expected: operation.expected(),
        }
    }
}

/*
The calculator contract:

add 1 2        -> 200 "3"
multiply 6 7   -> 200 "42"
divide 10 2    -> 200 "5"
divide 10 0    -> 406
sqrt 64 (mock) -> 200 "8"
*/
pub fn default_checks(config: &Config) -> Vec<Check> {
    vec![
        Check::new("add", Operation::Add(1, 2), config),
        Check::new("multiply", Operation::Multiply(6, 7), config),
        Check::new("divide", Operation::Divide(10, 2), config),
        Check::new("divide_by_zero", Operation::Divide(10, 0), config),
        Check::new("sqrt", Operation::Sqrt(64), config),
    ]
}

/*
Runs one check.

The URL is checked against the allow-list first. The response is closed on every path
out of here, assertion failures included.
*/
pub fn run_check(client: &Client, check: &Check) -> Result<(), CheckFailure> {
    if !is_safe_url(&check.url) {
        return Err(CheckFailure::UnsafeUrl { url: check.url.clone() });
    }

    let mut response = client.get(&check.url).map_err(|source| CheckFailure::Request {
        url: check.url.clone(),
        source,
    })?;
    let outcome = assert_response(&mut response, check);
    response.close();
    outcome
}

fn assert_response(response: &mut Response, check: &Check) -> Result<(), CheckFailure> {
    let request_failed = |source: ClientError| CheckFailure::Request {
        url: check.url.clone(),
        source,
    };

    if response.status() != check.expected.status {
        return Err(CheckFailure::Status {
            url: check.url.clone(),
            expected: check.expected.status,
            actual: response.status(),
        });
    }

    match &check.expected.body {
        Some(expected) => {
            let actual = response.text().map_err(request_failed)?;
            if &actual != expected {
                return Err(CheckFailure::Body {
                    url: check.url.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        None => {
            // Not part of the contract, but drain it anyway.
            response.read().map_err(request_failed)?;
        }
    }
    Ok(())
}

// Runs every check in order, one request at a time.
pub fn run_suite(client: &Client, checks: &[Check]) -> Vec<CheckReport> {
    checks
        .iter()
        .map(|check| {
            let result = run_check(client, check);
            match &result {
                Ok(()) => info!(check = %check.name, url = %check.url, "passed"),
                Err(err) => warn!(check = %check.name, url = %check.url, error = %err, "failed"),
            }
            CheckReport {
                name: check.name.clone(),
                url: check.url.clone(),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_checks_use_both_hosts() {
        let config = Config::default();
        let checks = default_checks(&config);
        let urls: Vec<&str> = checks.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:5000/calc/add/1/2",
                "http://localhost:5000/calc/multiply/6/7",
                "http://localhost:5000/calc/divide/10/2",
                "http://localhost:5000/calc/divide/10/0",
                "http://localhost:9090/calc/sqrt/64",
            ]
        );
        assert!(checks.iter().all(|c| is_safe_url(&c.url)));
    }

    #[test]
    fn test_unsafe_url_fails_without_request() {
        let config = Config {
            base_url: "http://calc.example.com".to_string(),
            ..Config::default()
        };
        let client = Client::new().expect("client builds");
        let check = Check::new("add", Operation::Add(1, 2), &config);
        let err = run_check(&client, &check).unwrap_err();
        assert!(matches!(err, CheckFailure::UnsafeUrl { .. }), "got {:?}", err);
    }

    #[test]
    fn test_failure_messages_name_url_and_values() {
        let err = CheckFailure::Body {
            url: "http://localhost:5000/calc/add/1/2".to_string(),
            expected: "3".to_string(),
            actual: "4".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("http://localhost:5000/calc/add/1/2"));
        assert!(message.contains("\"3\"") && message.contains("\"4\""));
    }
}
