// Which service answers an operation. Sqrt is only served by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Api,
    Mock,
}

// One calculator call, as exposed under /calc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Add(i64, i64),
    Multiply(i64, i64),
    Divide(i64, i64),
    Sqrt(u64),
}

// What a correct server answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub status: u16,
    // None when the body is not part of the contract.
    pub body: Option<String>,
}

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_ACCEPTABLE: u16 = 406;

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add(..) => "add",
            Operation::Multiply(..) => "multiply",
            Operation::Divide(..) => "divide",
            Operation::Sqrt(..) => "sqrt",
        }
    }

    pub fn service(&self) -> Service {
        match self {
            Operation::Sqrt(..) => Service::Mock,
            _ => Service::Api,
        }
    }

    // "/calc/add/1/2", "/calc/sqrt/64"
    pub fn path(&self) -> String {
        match self {
            Operation::Add(a, b) | Operation::Multiply(a, b) | Operation::Divide(a, b) => {
                format!("/calc/{}/{}/{}", self.name(), a, b)
            }
            Operation::Sqrt(n) => format!("/calc/sqrt/{}", n),
        }
    }

    // Full URL under the given base, which may or may not end in '/'.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }

    /*
    The answer a correct server gives.

    Integer results are computed without overflow (i128), exact quotients included. Division
    by zero is the one expected failure: 406 Not Acceptable, with whatever body the server likes.
    */
    pub fn expected(&self) -> Expected {
        let body = match *self {
            Operation::Add(a, b) => (a as i128 + b as i128).to_string(),
            Operation::Multiply(a, b) => (a as i128 * b as i128).to_string(),
            Operation::Divide(_, 0) => {
                return Expected {
                    status: STATUS_NOT_ACCEPTABLE,
                    body: None,
                };
            }
            Operation::Divide(a, b) if (a as i128) % (b as i128) == 0 => {
                (a as i128 / b as i128).to_string()
            }
            Operation::Divide(a, b) => format_decimal(a as f64 / b as f64),
            Operation::Sqrt(n) => format_decimal((n as f64).sqrt()),
        };
        Expected {
            status: STATUS_OK,
            body: Some(body),
        }
    }
}

// Shortest decimal form: 5.0 -> "5", 2.5 -> "2.5". Negative zero prints as "0".
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}
