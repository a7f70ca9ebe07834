//! Stream descriptor
//!
//! The immutable record describing one stream, sent verbatim to the
//! directory service on registration and deregistration.

use serde::{Deserialize, Serialize};

/// Describes a relayed stream to the directory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Human readable stream name, unique within the directory
    pub name: String,
    /// Where viewers connect, in `transport://host:port` form
    pub endpoint: String,
    /// Video size, e.g. "480x270"
    pub video_size: String,
    /// Video bit rate, e.g. "400k"
    pub bit_rate: String,
    /// Search keywords
    pub keywords: Vec<String>,
}

impl StreamDescriptor {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        video_size: impl Into<String>,
        bit_rate: impl Into<String>,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            video_size: video_size.into(),
            bit_rate: bit_rate.into(),
            keywords,
        }
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.endpoint)
    }
}

/// Format an endpoint string as `transport://host:port`
pub fn endpoint(transport: &str, host: &str, port: u16) -> String {
    format!("{}://{}:{}", transport, host, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format() {
        assert_eq!(endpoint("tcp", "localhost", 9600), "tcp://localhost:9600");
        assert_eq!(endpoint("udp", "10.0.0.1", 1), "udp://10.0.0.1:1");
    }

    #[test]
    fn test_display() {
        let desc = StreamDescriptor::new("news", "tcp://localhost:9600", "480x270", "400k", vec![]);
        assert_eq!(desc.to_string(), "news (tcp://localhost:9600)");
    }

    #[test]
    fn test_json_field_names() {
        let desc = StreamDescriptor::new(
            "news",
            "tcp://localhost:9600",
            "480x270",
            "400k",
            vec!["live".into(), "sports".into()],
        );
        let json = serde_json::to_value(&desc).unwrap();

        assert_eq!(json["name"], "news");
        assert_eq!(json["endpoint"], "tcp://localhost:9600");
        assert_eq!(json["video_size"], "480x270");
        assert_eq!(json["bit_rate"], "400k");
        assert_eq!(json["keywords"][1], "sports");
    }
}
