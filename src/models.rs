use serde::{Deserialize, Serialize};
use std::fmt;

/// Every answer the gate can give. Each maps to one fixed HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    Forbidden,
    NotAuthorized,
    TooManyRequests,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Ok,
        Outcome::Forbidden,
        Outcome::NotAuthorized,
        Outcome::TooManyRequests,
    ];

    pub fn status_line(self) -> &'static str {
        match self {
            Outcome::Ok => "HTTP/1.1 200 OK",
            Outcome::Forbidden => "HTTP/1.1 403 FORBIDDEN",
            Outcome::NotAuthorized => "HTTP/1.1 401 NOT AUTHORIZED",
            Outcome::TooManyRequests => "HTTP/1.1 429 TO MANY REQUESTS",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Outcome::Ok => "It's OK!",
            Outcome::Forbidden => "403 FORBIDDEN",
            Outcome::NotAuthorized => "401 NOT AUTHORIZED",
            Outcome::TooManyRequests => "429 TO MANY REQUESTS",
        }
    }

    // Status line, blank line, body. Written verbatim to the client.
    pub fn encode(self) -> Vec<u8> {
        format!("{}\n\n{}", self.status_line(), self.body()).into_bytes()
    }

    // Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Forbidden => "forbidden",
            Outcome::NotAuthorized => "not_authorized",
            Outcome::TooManyRequests => "too_many_requests",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Admin health response format
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub store: String,
}
