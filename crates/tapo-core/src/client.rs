//! Authenticated session with a single Tapo device.
//!
//! [`ApiClient`] owns the transport, the auth hash and, once logged in, the
//! session cipher. The session is either unauthenticated or ready; the cipher
//! only exists in the ready state, so nothing can be encrypted before a
//! handshake succeeds.
//!
//! ```text
//! Unauthenticated --login()--> Ready --cipher failure--> Unauthenticated
//!        ^                       |
//!        +----login() failure    +--refresh_session()--> Ready (new cipher)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tapo_core::{ApiClient, ClientConfig, Credentials, request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapo_core::Error> {
//!     let config = ClientConfig::new("192.168.1.100")
//!         .with_credentials(Credentials::new("user@example.com", "password"));
//!
//!     let mut client = ApiClient::connect(config).await?;
//!     let info = client
//!         .request(request::GET_DEVICE_INFO, &serde_json::json!({}))
//!         .await?;
//!     println!("{}", String::from_utf8_lossy(&info));
//!     Ok(())
//! }
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, de::DeserializeOwned, de::IgnoredAny};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Credentials,
    crypto::{AuthHash, KlapCipher, OsSeedSource, SeedSource},
    error::Error,
    handshake,
    request::{
        CONTROL_CHILD, ControlChildParams, DEFAULT_TERMINAL_UUID, GET_CHILD_DEVICE_LIST,
        RequestEnvelope,
    },
    response::{ApiResponse, ChildDeviceList, ControlChildResult},
    transport::{
        CONTENT_TYPE, DEFAULT_PORT, DEFAULT_TIMEOUT, HttpTransport, RawHttpTransport,
        request_path,
    },
};

/// Source of request timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(e) => {
                warn!(error = %e, "System clock is before the Unix epoch");
                0
            }
        }
    }
}

/// Configuration for connecting to a device.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The device hostname or IP address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Account credentials.
    pub credentials: Credentials,
    /// Connection and I/O timeout applied by the transport.
    pub timeout: Duration,
    /// Terminal identifier sent with every request.
    pub terminal_uuid: String,
}

impl ClientConfig {
    /// Creates a configuration with default port, timeout and blank credentials.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials: Credentials::blank(),
            timeout: DEFAULT_TIMEOUT,
            terminal_uuid: DEFAULT_TERMINAL_UUID.to_string(),
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the terminal identifier.
    pub fn with_terminal_uuid(mut self, terminal_uuid: impl Into<String>) -> Self {
        self.terminal_uuid = terminal_uuid.into();
        self
    }
}

/// Observable state of an [`ApiClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; `login` is required before `request`.
    Unauthenticated,
    /// A handshake succeeded and the cipher is ready.
    Ready,
}

enum Session {
    Unauthenticated,
    Ready(KlapCipher),
}

/// Client for one device, speaking KLAP over an [`HttpTransport`].
///
/// Requests take `&mut self`, so a single request/response round trip is the
/// unit of mutual exclusion. Share a client between tasks by wrapping it in a
/// `tokio::sync::Mutex`.
pub struct ApiClient<T = RawHttpTransport> {
    transport: T,
    username: String,
    auth_hash: AuthHash,
    seeds: Box<dyn SeedSource>,
    clock: Box<dyn Clock>,
    terminal_uuid: String,
    session: Session,
}

impl ApiClient<RawHttpTransport> {
    /// Creates an unauthenticated client for the configured device.
    pub fn new(config: ClientConfig) -> Self {
        let transport = RawHttpTransport::new(config.host, config.port, config.timeout);
        Self::with_transport(transport, &config.credentials)
            .with_terminal_uuid(config.terminal_uuid)
    }

    /// Creates a client and logs in.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let mut client = Self::new(config);
        client.login().await?;
        Ok(client)
    }
}

impl<T: HttpTransport> ApiClient<T> {
    /// Creates an unauthenticated client over `transport`.
    ///
    /// The auth hash is derived here, once; the password is not retained.
    pub fn with_transport(transport: T, credentials: &Credentials) -> Self {
        Self {
            transport,
            username: credentials.username.clone(),
            auth_hash: AuthHash::derive(credentials),
            seeds: Box::new(OsSeedSource),
            clock: Box::new(SystemClock),
            terminal_uuid: DEFAULT_TERMINAL_UUID.to_string(),
            session: Session::Unauthenticated,
        }
    }

    /// Creates an unauthenticated client with every collaborator injected.
    pub fn with_parts(
        transport: T,
        credentials: &Credentials,
        seeds: impl SeedSource + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self::with_transport(transport, credentials)
            .with_seed_source(seeds)
            .with_clock(clock)
    }

    /// Replaces the source of handshake seeds.
    pub fn with_seed_source(mut self, seeds: impl SeedSource + 'static) -> Self {
        self.seeds = Box::new(seeds);
        self
    }

    /// Replaces the clock used for request timestamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Sets the terminal identifier sent with every request.
    pub fn with_terminal_uuid(mut self, terminal_uuid: impl Into<String>) -> Self {
        self.terminal_uuid = terminal_uuid.into();
        self
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        match self.session {
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::Ready(_) => SessionState::Ready,
        }
    }

    /// Returns `true` if requests can be sent.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs a fresh handshake and installs a new session cipher.
    ///
    /// Any existing session is dropped first, along with the transport's
    /// cookies. On failure the client stays unauthenticated and the error is
    /// wrapped in [`Error::LoginFailed`].
    pub async fn login(&mut self) -> Result<(), Error> {
        self.session = Session::Unauthenticated;
        self.transport.reset_session();

        debug!(
            host = self.transport.host(),
            username = %self.username,
            "Logging in"
        );

        let result = self.establish().await;
        if let Err(e) = &result {
            debug!(host = self.transport.host(), error = %e, "Login failed");
        }
        result.map_err(|e| Error::LoginFailed(Box::new(e)))
    }

    /// Discards transport session state and logs in again.
    ///
    /// Call this when the device signals an expired session (a non-2xx status
    /// on [`request`](Self::request)). Requests built against the old session
    /// must not be retried against the new one.
    pub async fn refresh_session(&mut self) -> Result<(), Error> {
        self.transport.reset_session();
        self.login().await
    }

    /// Sends one encrypted request and returns the decrypted response body.
    ///
    /// Nothing is retried. A tag mismatch, malformed frame or exhausted
    /// sequence ends the session; a transport failure or non-2xx status is
    /// returned as-is and the caller decides whether to refresh.
    pub async fn request<P>(&mut self, method: &str, params: &P) -> Result<Vec<u8>, Error>
    where
        P: Serialize + ?Sized,
    {
        let envelope = RequestEnvelope {
            method,
            params,
            request_time_millis: self.clock.now_millis(),
            terminal_uuid: &self.terminal_uuid,
        };
        let body =
            serde_json::to_vec(&envelope).map_err(|e| Error::Serialization(e.to_string()))?;

        let result = self.round_trip(&body).await;
        if let Err(e) = &result
            && matches!(
                e,
                Error::Integrity | Error::MalformedFrame(_) | Error::SequenceExhausted
            )
        {
            warn!(
                host = self.transport.host(),
                method,
                error = %e,
                "Dropping KLAP session after cipher failure"
            );
            self.session = Session::Unauthenticated;
        }
        result
    }

    /// Sends a request and parses the `result` of the response envelope.
    pub async fn request_json<P, R>(&mut self, method: &str, params: &P) -> Result<R, Error>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.request(method, params).await?;
        ApiResponse::from_slice(&body)?.into_result()
    }

    /// Sends a request whose result is not needed, checking only the error code.
    pub async fn execute<P>(&mut self, method: &str, params: &P) -> Result<(), Error>
    where
        P: Serialize + ?Sized,
    {
        self.request_json::<P, IgnoredAny>(method, params)
            .await
            .map(|_| ())
    }

    /// Forwards a request to a hub child device and parses its result.
    pub async fn control_child<P, R>(
        &mut self,
        device_id: &str,
        method: &str,
        params: P,
    ) -> Result<R, Error>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = ControlChildParams::new(device_id, method, params);
        let outer: ControlChildResult = self.request_json(CONTROL_CHILD, &params).await?;
        outer.response_data.into_result()
    }

    /// Looks up a hub child device by ID in the hub's child list.
    ///
    /// Returns `Ok(None)` if no child with that ID is paired.
    pub async fn child_by_id(&mut self, device_id: &str) -> Result<Option<Value>, Error> {
        let list: ChildDeviceList = self
            .request_json(GET_CHILD_DEVICE_LIST, &serde_json::Map::new())
            .await?;
        Ok(list.find(device_id).cloned())
    }

    async fn establish(&mut self) -> Result<(), Error> {
        let local_seed = self.seeds.next_seed()?;
        let seeds = handshake::perform(&mut self.transport, local_seed, &self.auth_hash).await?;
        let cipher = KlapCipher::new(&seeds, &self.auth_hash);

        debug!(
            host = self.transport.host(),
            seq = cipher.seq(),
            "KLAP session established"
        );

        self.session = Session::Ready(cipher);
        Ok(())
    }

    async fn round_trip(&mut self, body: &[u8]) -> Result<Vec<u8>, Error> {
        let Session::Ready(cipher) = &mut self.session else {
            return Err(Error::NotAuthenticated);
        };

        let (frame, seq) = cipher.encrypt(body)?;
        let path = request_path(seq);

        debug!(host = self.transport.host(), seq, "Sending KLAP request");

        let response = self.transport.post(&path, CONTENT_TYPE, &frame).await?;
        if !response.is_success() {
            return Err(Error::Status {
                endpoint: path,
                status: response.status,
            });
        }

        cipher.decrypt(&response.body)
    }
}

// Implement Debug manually to avoid exposing the auth hash
impl<T: std::fmt::Debug> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport)
            .field("username", &self.username)
            .field("auth_hash", &"[REDACTED]")
            .field("terminal_uuid", &self.terminal_uuid)
            .field(
                "session",
                &match self.session {
                    Session::Unauthenticated => SessionState::Unauthenticated,
                    Session::Ready(_) => SessionState::Ready,
                },
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        request::{DeviceOnParams, GET_DEVICE_INFO, SET_DEVICE_INFO},
        testing::{DEVICE_INFO_RESPONSE, DeviceBehavior, FixedClock, FixedSeeds, SimulatedDevice},
    };

    const TIMESTAMP: i64 = 1_700_000_000_000;

    fn credentials() -> Credentials {
        Credentials::new("user@example.com", "secret")
    }

    fn client(device: SimulatedDevice) -> ApiClient<SimulatedDevice> {
        ApiClient::with_parts(
            device,
            &credentials(),
            FixedSeeds::new([[0xa1; 16], [0xa2; 16], [0xa3; 16]]),
            FixedClock(TIMESTAMP),
        )
    }

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(credentials(), [0xb2; 16])
    }

    #[tokio::test]
    async fn test_get_device_info_end_to_end() {
        let device = device().with_handler(|request| {
            let request: Value = serde_json::from_slice(request).unwrap();
            assert_eq!(request["method"], "get_device_info");
            assert_eq!(request["params"], json!({}));
            DEVICE_INFO_RESPONSE.as_bytes().to_vec()
        });
        let mut client = client(device);

        client.login().await.unwrap();
        assert_eq!(client.state(), SessionState::Ready);

        let response = client
            .request(GET_DEVICE_INFO, &json!({}))
            .await
            .unwrap();

        assert_eq!(response, br#"{"error_code":0,"result":{"device_on":true}}"#);
        assert_eq!(
            client.transport().paths(),
            vec!["handshake1", "handshake2", "request?seq=231096708"]
        );
    }

    #[tokio::test]
    async fn test_request_frame_is_deterministic() {
        let mut client = client(device());
        client.login().await.unwrap();
        client.request(GET_DEVICE_INFO, &json!({})).await.unwrap();

        let device = client.transport();
        assert_eq!(device.frames()[0], [0xa1; 16]);
        assert_eq!(
            hex::encode(&device.frames()[1]),
            "2c9dc2982dc8477692a522eb0b02b8cb37a4a13aa334b2466d6d0998c9e7b0b9"
        );
        assert_eq!(
            hex::encode(&device.frames()[2]),
            "9c9fd505a0f78d241c0ddfce6eaa7e67d110e0b997b18daed8c6b354120f91bb\
             691d9cd4808894936d102d4dc977afded762f9018c767e676a9212ed8d959ab4\
             5425d7aecbabaeb069f051e7974d7190fc05d8de88a325efccfef1b55ead4e5f\
             e5e87ac64186c510331d203c62f3d50bf2f3fa91912acfe7699cfd7b0b9febce\
             3e69b22ab23524fb83b2a47af3cc0f14"
        );
        assert_eq!(
            device.requests()[0],
            br#"{"method":"get_device_info","params":{},"requestTimeMilis":1700000000000,"terminalUUID":"00-00-00-00-00-00"}"#
        );
    }

    #[tokio::test]
    async fn test_request_before_login() {
        let mut client = client(device());
        let result = client.request(GET_DEVICE_INFO, &json!({})).await;
        assert!(matches!(result, Err(Error::NotAuthenticated)));
        assert!(client.transport().paths().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_is_distinguishable() {
        let wrong = Credentials::new("user@example.com", "wrong");
        let mut client = ApiClient::with_transport(device(), &wrong)
            .with_seed_source(FixedSeeds::new([[0xa1; 16]]));

        let err = client.login().await.unwrap_err();

        assert!(err.is_login_failure());
        assert!(matches!(err.root_cause(), Error::AuthenticationFailed(_)));
        assert_eq!(client.state(), SessionState::Unauthenticated);
        assert_eq!(client.transport().paths(), vec!["handshake1"]);
    }

    #[tokio::test]
    async fn test_randomness_failure_aborts_login() {
        let mut client = ApiClient::with_transport(device(), &credentials())
            .with_seed_source(FixedSeeds::new([]));

        let err = client.login().await.unwrap_err();

        assert!(matches!(err.root_cause(), Error::Randomness(_)));
        assert!(client.transport().paths().is_empty());
        assert!(!client.is_ready());
    }

    #[tokio::test]
    async fn test_failed_relogin_drops_previous_session() {
        let mut client = client(device());
        client.login().await.unwrap();

        client
            .transport
            .set_behavior(DeviceBehavior::RejectHandshake2);
        assert!(client.login().await.is_err());

        assert_eq!(client.state(), SessionState::Unauthenticated);
        assert!(matches!(
            client.request(GET_DEVICE_INFO, &json!({})).await,
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_login_clears_transport_session() {
        let mut client = client(device());
        client.login().await.unwrap();
        assert_eq!(client.transport().resets(), 1);

        client.refresh_session().await.unwrap();
        assert!(client.transport().resets() >= 2);
    }

    #[tokio::test]
    async fn test_refresh_session_uses_new_seeds() {
        let mut client = client(device());
        client.login().await.unwrap();
        client.request(GET_DEVICE_INFO, &json!({})).await.unwrap();
        let first_seq = client.transport().request_seqs()[0];

        client.transport.set_remote_seed([0xc3; 16]);
        client.refresh_session().await.unwrap();
        assert_eq!(client.transport().last_local_seed(), Some([0xa2; 16]));

        client.request(GET_DEVICE_INFO, &json!({})).await.unwrap();
        let seqs = client.transport().request_seqs();
        assert_eq!(seqs.len(), 2);
        assert_ne!(seqs[1], first_seq + 1);
    }

    #[tokio::test]
    async fn test_expired_session_then_refresh() {
        let mut client = client(device());
        client.login().await.unwrap();

        client.transport.expire_session();
        let err = client
            .request(GET_DEVICE_INFO, &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Status { status: 403, .. }));
        assert!(!err.is_login_failure());

        client.refresh_session().await.unwrap();
        let response = client.request(GET_DEVICE_INFO, &json!({})).await.unwrap();
        assert_eq!(response, DEVICE_INFO_RESPONSE.as_bytes());
    }

    #[tokio::test]
    async fn test_tampered_response_ends_session() {
        let mut client = client(device().with_behavior(DeviceBehavior::TamperResponse));
        client.login().await.unwrap();

        let result = client.request(GET_DEVICE_INFO, &json!({})).await;

        assert!(matches!(result, Err(Error::Integrity)));
        assert_eq!(client.state(), SessionState::Unauthenticated);
        assert!(matches!(
            client.request(GET_DEVICE_INFO, &json!({})).await,
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_sequence_increases_per_request() {
        let mut client = client(device());
        client.login().await.unwrap();
        for _ in 0..5 {
            client.request(GET_DEVICE_INFO, &json!({})).await.unwrap();
        }

        let seqs = client.transport().request_seqs();
        assert_eq!(seqs.len(), 5);
        assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + 1));
    }

    #[tokio::test]
    async fn test_request_json_and_device_errors() {
        let device = device().with_handler(|request| {
            let request: Value = serde_json::from_slice(request).unwrap();
            match request["method"].as_str() {
                Some("get_device_info") => DEVICE_INFO_RESPONSE.as_bytes().to_vec(),
                Some("set_device_info") => br#"{"error_code":0}"#.to_vec(),
                _ => br#"{"error_code":-1002}"#.to_vec(),
            }
        });
        let mut client = client(device);
        client.login().await.unwrap();

        let info: Value = client
            .request_json(GET_DEVICE_INFO, &json!({}))
            .await
            .unwrap();
        assert_eq!(info["device_on"], true);

        client
            .execute(SET_DEVICE_INFO, &DeviceOnParams { device_on: false })
            .await
            .unwrap();

        let err = client
            .request_json::<_, Value>("unknown_method", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Device { code: -1002 }));
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_control_child() {
        let device = device().with_handler(|request| {
            let request: Value = serde_json::from_slice(request).unwrap();
            assert_eq!(request["method"], "control_child");
            assert_eq!(request["params"]["device_id"], "child-1");
            assert_eq!(request["params"]["requestData"]["method"], "get_device_info");
            json!({
                "error_code": 0,
                "result": {"responseData": {"error_code": 0, "result": {"nickname": "Porch"}}}
            })
            .to_string()
            .into_bytes()
        });
        let mut client = client(device);
        client.login().await.unwrap();

        let child: Value = client
            .control_child("child-1", GET_DEVICE_INFO, json!({}))
            .await
            .unwrap();
        assert_eq!(child["nickname"], "Porch");
    }

    #[tokio::test]
    async fn test_child_by_id() {
        let device = device().with_handler(|request| {
            let request: Value = serde_json::from_slice(request).unwrap();
            assert_eq!(request["method"], "get_child_device_list");
            json!({
                "error_code": 0,
                "result": {
                    "child_device_list": [
                        {"device_id": "child-1", "model": "S210", "device_on": true},
                        {"device_id": "child-2", "model": "T310"}
                    ],
                    "start_index": 0,
                    "sum": 2
                }
            })
            .to_string()
            .into_bytes()
        });
        let mut client = client(device);
        client.login().await.unwrap();

        let child = client.child_by_id("child-1").await.unwrap().unwrap();
        assert_eq!(child["model"], "S210");
        assert_eq!(child["device_on"], true);

        assert!(client.child_by_id("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_millis() > TIMESTAMP);
    }

    #[tokio::test]
    async fn test_shared_client_serializes_round_trips() {
        let mut client = client(device());
        client.login().await.unwrap();
        let client = Arc::new(Mutex::new(client));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    for _ in 0..5 {
                        client
                            .lock()
                            .await
                            .request(GET_DEVICE_INFO, &json!({}))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let client = client.lock().await;
        let seqs = client.transport().request_seqs();
        assert_eq!(seqs.len(), 20);
        assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + 1));
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = ClientConfig::new("10.0.0.2");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.terminal_uuid, DEFAULT_TERMINAL_UUID);
        assert!(config.credentials.is_blank());

        let config = config
            .with_port(8080)
            .with_timeout(Duration::from_secs(2))
            .with_credentials(credentials())
            .with_terminal_uuid("AA-BB");
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.credentials.username, "user@example.com");
        assert_eq!(config.terminal_uuid, "AA-BB");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let client = ApiClient::new(ClientConfig::new("10.0.0.2").with_credentials(credentials()));
        let debug = format!("{:?}", client);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("Unauthenticated"));
    }
}
