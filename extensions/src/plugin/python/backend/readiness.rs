use serde::Deserialize;

/// Banners Flask prints once the development server is listening.
pub const DEFAULT_READY_MARKERS: [&str; 2] = ["Serving Flask app", "Running on"];

/// Handshake version this crate understands.
pub const HANDSHAKE_PROTOCOL: u32 = 1;

/// How the backend announced that it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// A `{"event":"ready","protocol":N}` line.
    Handshake { protocol: u32 },
    /// A stdout line containing one of the marker substrings.
    Banner(String),
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum HandshakeLine {
    Ready {
        #[serde(default = "default_protocol")]
        protocol: u32,
    },
}

fn default_protocol() -> u32 {
    HANDSHAKE_PROTOCOL
}

/// Decides whether a line (or unterminated fragment) of backend stdout
/// signals readiness.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    markers: Vec<String>,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self::new(DEFAULT_READY_MARKERS.iter().map(|m| m.to_string()).collect())
    }
}

impl ReadinessDetector {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    /// A structured handshake wins over marker text. Anything else is `None`.
    pub fn detect(&self, line: &str) -> Option<Readiness> {
        let line = line.trim();
        if line.starts_with('{') {
            if let Ok(HandshakeLine::Ready { protocol }) = serde_json::from_str(line) {
                return Some(Readiness::Handshake { protocol });
            }
        }
        self.markers
            .iter()
            .find(|marker| line.contains(marker.as_str()))
            .map(|marker| Readiness::Banner(marker.clone()))
    }
}
