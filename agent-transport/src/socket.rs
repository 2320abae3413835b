use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_core::constants::{DIAL_BASE_STARTUP_SECS, DIAL_MAX_ATTEMPTS, MAX_MISSED_PINGS, PING_INTERVAL_SECS};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::Connector;
use tracing::{error, info, warn};
use url::Url;

use crate::errors::TransportError;

/// What goes through the single writer task's queue (spec.md §4.5 "Send queue": strictly serial
/// `{PING, MESSAGE, EXIT}`, grounded on `original_source/watch/websocket.go`'s `ReqType`). `Ping`
/// is raised by the liveness task, `Message` carries the coordinator's report bytes, `Exit` is
/// raised internally when liveness is lost.
enum Outbound {
    Ping,
    Message(Vec<u8>),
    Exit,
}

/// A connected WebSocket handle. Owning a single writer task in place of the original's
/// mutex-guarded connection: every outbound frame — pings included — funnels through one channel
/// so writes are serialized by construction rather than by a lock.
pub struct WebSocketTransport {
    outbound_tx: mpsc::Sender<Outbound>,
}

impl WebSocketTransport {
    /// Dials with bounded-randomized backoff (spec.md §4.5 dial policy) and spawns the writer,
    /// reader and liveness tasks. Fails only when every dial attempt in the budget is exhausted —
    /// from then on, any failure is fatal to the process (spec.md §9 Open Question 1).
    pub async fn connect(url: Url, customer_guid: &str, cluster_name: &str, tls_insecure: bool) -> anyhow::Result<WebSocketTransport> {
        let url = with_query(url, customer_guid, cluster_name);
        let connector = tls_insecure.then(insecure_connector);

        let stream = dial_with_backoff(&url, connector, DIAL_BASE_STARTUP_SECS).await?;
        let (sink, stream) = stream.split();

        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let missed_pings = Arc::new(AtomicU32::new(0));

        tokio::spawn(run_writer(sink, outbound_rx));
        tokio::spawn(run_reader(stream, missed_pings.clone(), outbound_tx.clone()));
        tokio::spawn(run_pinger(missed_pings, outbound_tx.clone()));

        Ok(WebSocketTransport { outbound_tx })
    }

    /// Enqueues a report for delivery. The process exits(4) from the writer task if the send
    /// fails; this method only exits if the writer task itself is already gone.
    pub async fn send(&self, payload: Vec<u8>) {
        if let Err(err) = self.outbound_tx.send(Outbound::Message(payload)).await {
            let err = TransportError::SendFailed(err.to_string());
            error!(%err, "transport writer task is no longer running");
            std::process::exit(4);
        }
    }
}

fn with_query(mut url: Url, customer_guid: &str, cluster_name: &str) -> Url {
    url.query_pairs_mut().append_pair("customerGUID", customer_guid).append_pair("clusterName", cluster_name);
    url
}

/// Upper bound of the randomized delay before dial attempt `attempt` (0-indexed), mirroring
/// `original_source/watch/websocket.go`'s `(counter+1)*sleepBeforeConnection`. Pulled out as a
/// pure function so the backoff bound (spec.md §8 property P6) is testable without a mock clock.
fn backoff_ceiling_secs(attempt: u32, base_secs: u64) -> u64 {
    (attempt as u64 + 1) * base_secs
}

async fn dial_with_backoff(
    url: &Url,
    connector: Option<Connector>,
    base_secs: u64,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, TransportError> {
    for attempt in 0..DIAL_MAX_ATTEMPTS {
        let ceiling = backoff_ceiling_secs(attempt, base_secs);
        let delay = rand::thread_rng().gen_range(0..=ceiling.max(1));
        info!(attempt, delay_secs = delay, url = %url, "dialing report receiver");
        tokio::time::sleep(Duration::from_secs(delay)).await;

        let result = tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, connector.clone()).await;
        match result {
            Ok((stream, _response)) => {
                info!(url = %url, "connected to report receiver");
                return Ok(stream);
            },
            Err(err) => warn!(attempt, %err, "failed to connect, retrying"),
        }
    }

    Err(TransportError::DialExhausted { url: url.to_string(), attempts: DIAL_MAX_ATTEMPTS })
}

/// Single task owning the write half. Every `Message` failure or `Exit` command is fatal, same as
/// `MESSAGE`/`EXIT` in the original's send loop.
async fn run_writer<S>(mut sink: S, mut outbound_rx: mpsc::Receiver<Outbound>)
where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(cmd) = outbound_rx.recv().await {
        match cmd {
            Outbound::Ping => {
                if let Err(err) = sink.send(WsMessage::Ping(Vec::new())).await {
                    warn!(%err, "failed to send ping");
                }
            },
            Outbound::Message(bytes) => {
                if let Err(err) = sink.send(WsMessage::Binary(bytes)).await {
                    error!(%err, "failed to send report, exiting for the pod to restart and reconnect");
                    std::process::exit(4);
                }
            },
            Outbound::Exit => {
                error!("liveness lost, exiting for the pod to restart and reconnect");
                std::process::exit(4);
            },
        }
    }
}

/// Reads frames off the connection purely to detect liveness: any inbound Ping or Pong resets the
/// missed-ping counter, any stream error or close is fatal (spec.md §4.5 liveness).
async fn run_reader<S>(mut stream: S, missed_pings: Arc<AtomicU32>, outbound_tx: mpsc::Sender<Outbound>)
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => missed_pings.store(0, Ordering::SeqCst),
            Ok(WsMessage::Close(frame)) => {
                warn!(?frame, "report receiver closed the connection");
                let _ = outbound_tx.send(Outbound::Exit).await;
                return;
            },
            Ok(_) => {},
            Err(err) => {
                warn!(%err, "read error on report receiver connection");
                let _ = outbound_tx.send(Outbound::Exit).await;
                return;
            },
        }
    }
    let _ = outbound_tx.send(Outbound::Exit).await;
}

/// Pings on a fixed interval and declares the connection dead after `MAX_MISSED_PINGS`
/// consecutive pings go unanswered (spec.md §4.5, `original_source/watch/websocket.go`'s
/// `counter > 2` threshold).
async fn run_pinger(missed_pings: Arc<AtomicU32>, outbound_tx: mpsc::Sender<Outbound>) {
    let interval = Duration::from_secs(PING_INTERVAL_SECS);
    loop {
        if outbound_tx.send(Outbound::Ping).await.is_err() {
            return;
        }

        if missed_pings.fetch_add(1, Ordering::SeqCst) + 1 > MAX_MISSED_PINGS {
            let _ = outbound_tx.send(Outbound::Exit).await;
            return;
        }

        tokio::time::sleep(interval).await;
    }
}

/// Backs `CA_IGNORE_VERIFY_CACLI` (spec.md §6): skip server certificate verification entirely.
/// Opt-in only, never the default connector.
fn insecure_connector() -> Connector {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
        .with_no_client_auth();
    Connector::Rustls(Arc::new(config))
}

#[derive(Debug)]
struct AcceptAllVerifier;

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_with_query_sets_customer_guid_and_cluster_name() {
        let url = Url::parse("wss://receiver.example.com/v1/report").unwrap();
        let url = with_query(url, "guid-1", "cluster-a");
        assert!(url.query().unwrap().contains("customerGUID=guid-1"));
        assert!(url.query().unwrap().contains("clusterName=cluster-a"));
    }

    #[rstest]
    #[case(0, 30, 30)]
    #[case(1, 30, 60)]
    #[case(4, 30, 150)]
    #[case(0, 60, 60)]
    fn test_backoff_ceiling_grows_linearly_with_attempt(#[case] attempt: u32, #[case] base_secs: u64, #[case] expected: u64) {
        assert_eq!(backoff_ceiling_secs(attempt, base_secs), expected);
    }

    #[test]
    fn test_dial_exhausted_error_reports_attempts() {
        let err = TransportError::DialExhausted { url: "wss://receiver.example.com".into(), attempts: DIAL_MAX_ATTEMPTS };
        assert!(err.to_string().contains(&DIAL_MAX_ATTEMPTS.to_string()));
    }
}
