//! Wire protocol: one JSON message per connection direction.
//!
//! The sender writes the full encoded request and half-closes its write side.
//! The receiver reads to end-of-stream, decodes, writes back a single encoded
//! response and closes the connection. There is no length prefix and no
//! connection reuse; message boundaries are connection boundaries.
//!
//! A failure to decode on either side simply drops the connection. The peer
//! sees that as an empty or truncated stream, never as a structured error.

use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ReadLimits;
use crate::errors::{ClusterError, ClusterResult};
use crate::types::CoordinatorResponse;

/// Timeouts and limits for one client-side request/response exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeOptions {
    pub connect_timeout: Duration,
    /// Bounds writing the request plus reading the whole response
    pub io_timeout: Duration,
    pub max_response_bytes: usize,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        let limits = ReadLimits::default();
        Self {
            connect_timeout: Duration::from_secs(3),
            io_timeout: limits.read_timeout(),
            max_response_bytes: limits.max_message_bytes,
        }
    }
}

/// Read from `reader` until end-of-stream, refusing more than `max_bytes`
pub async fn read_to_eof<R>(reader: &mut R, max_bytes: usize) -> ClusterResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    // One byte past the limit tells "exactly max" apart from "too large"
    let mut limited = reader.take((max_bytes as u64).saturating_add(1));
    limited.read_to_end(&mut buffer).await?;

    if buffer.len() > max_bytes {
        return Err(ClusterError::MessageTooLarge {
            size: buffer.len(),
            max_size: max_bytes,
        });
    }
    Ok(buffer)
}

/// Read and decode one message, bounded by `limits`
pub async fn read_message<T, R>(reader: &mut R, limits: &ReadLimits) -> ClusterResult<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let bytes = tokio::time::timeout(limits.read_timeout(), read_to_eof(reader, limits.max_message_bytes))
        .await
        .map_err(|_| ClusterError::Timeout {
            operation: "reading request".to_string(),
        })??;

    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode `message`, write it in full and shut down the write side
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> ClusterResult<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(message)?;
    writer.write_all(&bytes).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Send one task to `addr` and wait for its response.
///
/// Used by the coordinator towards each worker and by the service towards the
/// coordinator.
pub async fn send_task<T>(addr: &str, task: &T, options: &ExchangeOptions) -> ClusterResult<CoordinatorResponse>
where
    T: Serialize,
{
    let payload = serde_json::to_vec(task)?;
    exchange(addr, &payload, options).await
}

/// Send an already encoded request to `addr` and decode the response.
///
/// Lets a caller encode once and send the same bytes to many endpoints.
pub async fn exchange(addr: &str, payload: &[u8], options: &ExchangeOptions) -> ClusterResult<CoordinatorResponse> {
    let mut stream = match tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ClusterError::Unreachable {
                addr: addr.to_string(),
                message: format!("connect failed: {}", e),
                is_timeout: e.kind() == std::io::ErrorKind::TimedOut,
            })
        }
        Err(_) => {
            return Err(ClusterError::Unreachable {
                addr: addr.to_string(),
                message: format!("connect timed out after {:?}", options.connect_timeout),
                is_timeout: true,
            })
        }
    };

    let io = async {
        stream.write_all(payload).await?;
        // Half-close: the peer reads until it sees end-of-stream
        stream.shutdown().await?;
        read_to_eof(&mut stream, options.max_response_bytes).await
    };

    let bytes = match tokio::time::timeout(options.io_timeout, io).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            return Err(ClusterError::Unreachable {
                addr: addr.to_string(),
                message: e.to_string(),
                is_timeout: e.is_timeout(),
            })
        }
        Err(_) => {
            return Err(ClusterError::Unreachable {
                addr: addr.to_string(),
                message: format!("no response within {:?}", options.io_timeout),
                is_timeout: true,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| ClusterError::MalformedResponse {
        addr: addr.to_string(),
        reason: if bytes.is_empty() {
            "connection closed without a response".to_string()
        } else {
            e.to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskMessage;

    #[tokio::test]
    async fn test_read_to_eof_enforces_limit() {
        let mut exact: &[u8] = b"12345";
        assert_eq!(read_to_eof(&mut exact, 5).await.unwrap(), b"12345");

        let mut oversized: &[u8] = b"123456";
        let err = read_to_eof(&mut oversized, 5).await.unwrap_err();
        assert!(matches!(err, ClusterError::MessageTooLarge { max_size: 5, .. }));
    }

    #[tokio::test]
    async fn test_read_to_eof_with_unbounded_limit() {
        let mut raw: &[u8] = b"{}";
        assert_eq!(read_to_eof(&mut raw, usize::MAX).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_floats_survive_the_wire_exactly() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        // Values whose shortest decimal form parses back off by one ulp without exact float parsing
        let values = vec![0.21693045781865614, 0.9999999999999999, 0.1 + 0.2, 1.0 / 3.0, 5e-324, f64::MAX];
        let response = CoordinatorResponse {
            result: values.clone(),
            indexes: None,
        };

        write_message(&mut server, &response).await.unwrap();
        let decoded: CoordinatorResponse = read_message(&mut client, &ReadLimits::default()).await.unwrap();
        for (sent, received) in values.iter().zip(&decoded.result) {
            assert_eq!(sent.to_bits(), received.to_bits());
        }
    }

    #[tokio::test]
    async fn test_read_message_decodes_task() {
        let mut raw: &[u8] = br#"{"type":"SIMILARITY","matrix":[[1.0,0.0]],"userIndex":0,"k":0}"#;
        let task: TaskMessage = read_message(&mut raw, &ReadLimits::default()).await.unwrap();
        assert_eq!(task.matrix.num_items(), 2);
    }

    #[tokio::test]
    async fn test_read_message_rejects_garbage() {
        let mut raw: &[u8] = b"not json";
        let result: ClusterResult<TaskMessage> = read_message(&mut raw, &ReadLimits::default()).await;
        assert!(matches!(result, Err(ClusterError::Codec { .. })));
    }

    #[tokio::test]
    async fn test_write_message_round_trip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let response = CoordinatorResponse {
            result: vec![0.25, 0.5],
            indexes: Some(vec![1, 0]),
        };

        write_message(&mut server, &response).await.unwrap();
        let decoded: CoordinatorResponse = read_message(&mut client, &ReadLimits::default()).await.unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_exchange_unreachable_peer() {
        // Bind then drop to get a local port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let options = ExchangeOptions {
            connect_timeout: Duration::from_millis(500),
            ..ExchangeOptions::default()
        };
        let err = exchange(&addr, b"{}", &options).await.unwrap_err();
        assert!(matches!(err, ClusterError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_exchange_peer_closes_without_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_to_eof(&mut socket, 1024).await;
            // Drop without writing anything
        });

        let err = exchange(&addr, b"{}", &ExchangeOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClusterError::MalformedResponse { .. }));
    }
}
