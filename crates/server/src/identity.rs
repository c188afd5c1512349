//! Maps request credentials onto the one capability the lifecycle cares about: whether the
//! caller may respond to offers.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    Employee,
    Customer,
}

impl Caller {
    pub fn is_employee(self) -> bool {
        matches!(self, Self::Employee)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Customer => "customer",
        }
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    employee_token: SecretString,
}

impl IdentityResolver {
    pub fn new(employee_token: SecretString) -> Self {
        Self { employee_token }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Caller {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if tokens_match(token, self.employee_token.expose_secret()) => {
                Caller::Employee
            }
            _ => Caller::Customer,
        }
    }
}

/// Length mismatches still run a comparison so timing does not reveal the token length.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    if presented.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    presented.ct_eq(expected).into()
}
