use async_trait::async_trait;
use harvester_common::{HarvesterError, Result, hash::HASH_HEADER};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::debug;

/// An encoded batch: gzip-compressed JSON plus the signature of the uncompressed JSON.
#[derive(Debug, Clone)]
pub struct Submission {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub records: usize,
}

/// Destination of agent batches.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<()>;
}

/// Posts batches to a sink service's `/updates/` endpoint. The client advertises
/// `Accept-Encoding: gzip` itself and transparently decodes compressed replies.
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(address: &str) -> Self {
        Self {
            endpoint: format!("{}/updates/", address.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn submit(&self, submission: &Submission) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(submission.body.clone());
        if let Some(signature) = &submission.signature {
            request = request.header(HASH_HEADER, signature.as_str());
        }

        let response = request.send().await.map_err(|err| {
            HarvesterError::ConnectionException(format!(
                "failed to send metrics to {}: {err}",
                self.endpoint
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HarvesterError::UpstreamStatus {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        debug!(endpoint = %self.endpoint, records = submission.records, "batch delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_targets_batch_route() {
        assert_eq!(
            HttpSink::new("http://localhost:8080").endpoint(),
            "http://localhost:8080/updates/"
        );
        assert_eq!(
            HttpSink::new("http://localhost:8080/").endpoint(),
            "http://localhost:8080/updates/"
        );
    }

    #[tokio::test]
    async fn unreachable_sink_is_a_connection_exception() {
        // Nothing listens on the loopback discard port.
        let sink = HttpSink::new("http://127.0.0.1:9");
        let submission = Submission {
            body: Vec::new(),
            signature: None,
            records: 0,
        };
        assert!(matches!(
            sink.submit(&submission).await,
            Err(HarvesterError::ConnectionException(_))
        ));
    }
}
