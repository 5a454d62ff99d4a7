use std::fmt;

/// The four named targets the broker exposes. `Request`,
/// `Process`, and `Response` form the job lifecycle queue; `Cache` backs the
/// result cache, modeled as a fourth broker target whose entries never
/// expire on their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrokerTarget {
    Request,
    Process,
    Response,
    Cache,
}

impl BrokerTarget {
    pub const ALL: [BrokerTarget; 4] = [
        BrokerTarget::Request,
        BrokerTarget::Process,
        BrokerTarget::Response,
        BrokerTarget::Cache,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            BrokerTarget::Request => "request_broker.jsonl",
            BrokerTarget::Process => "process_broker.jsonl",
            BrokerTarget::Response => "response_broker.jsonl",
            BrokerTarget::Cache => "result_cache.jsonl",
        }
    }
}

impl fmt::Display for BrokerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrokerTarget::Request => "request",
            BrokerTarget::Process => "process",
            BrokerTarget::Response => "response",
            BrokerTarget::Cache => "cache",
        };
        write!(f, "{s}")
    }
}
