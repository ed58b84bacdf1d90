//! Test doubles: a simulated device and deterministic collaborators.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::{
    Credentials,
    client::Clock,
    crypto::{
        SeedSource,
        klap::{
            AuthHash, KlapCipher, SEED_LEN, Seed, SessionSeeds, handshake1_seed_auth_hash,
            handshake2_seed_auth_hash,
        },
    },
    error::Error,
    transport::{HANDSHAKE1_PATH, HANDSHAKE2_PATH, HttpResponse, HttpTransport},
};

pub(crate) const DEVICE_INFO_RESPONSE: &str = r#"{"error_code":0,"result":{"device_on":true}}"#;

/// How the simulated device deviates from the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum DeviceBehavior {
    #[default]
    Honest,
    TamperServerHash,
    TruncateHandshake1,
    OmitServerHash,
    FailHandshake1Status,
    RejectHandshake2,
    TamperResponse,
}

type Handler = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Device side of the KLAP protocol, answering in memory.
pub(crate) struct SimulatedDevice {
    auth_hash: AuthHash,
    remote_seed: Seed,
    behavior: DeviceBehavior,
    local_seed: Option<Seed>,
    cipher: Option<KlapCipher>,
    handler: Handler,
    paths: Vec<String>,
    frames: Vec<Vec<u8>>,
    requests: Vec<Vec<u8>>,
    resets: usize,
}

impl SimulatedDevice {
    pub(crate) fn new(credentials: Credentials, remote_seed: Seed) -> Self {
        Self {
            auth_hash: AuthHash::derive(&credentials),
            remote_seed,
            behavior: DeviceBehavior::Honest,
            local_seed: None,
            cipher: None,
            handler: Box::new(|_| DEVICE_INFO_RESPONSE.as_bytes().to_vec()),
            paths: Vec::new(),
            frames: Vec::new(),
            requests: Vec::new(),
            resets: 0,
        }
    }

    pub(crate) fn with_behavior(mut self, behavior: DeviceBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub(crate) fn with_handler(
        mut self,
        handler: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub(crate) fn set_behavior(&mut self, behavior: DeviceBehavior) {
        self.behavior = behavior;
    }

    pub(crate) fn set_remote_seed(&mut self, remote_seed: Seed) {
        self.remote_seed = remote_seed;
    }

    /// Forgets the session, as a device does when it expires.
    pub(crate) fn expire_session(&mut self) {
        self.cipher = None;
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.cipher.is_some()
    }

    pub(crate) fn paths(&self) -> Vec<&str> {
        self.paths.iter().map(String::as_str).collect()
    }

    pub(crate) fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub(crate) fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    pub(crate) fn last_local_seed(&self) -> Option<Seed> {
        self.local_seed
    }

    pub(crate) fn resets(&self) -> usize {
        self.resets
    }

    /// Sequence numbers of every request, in arrival order.
    pub(crate) fn request_seqs(&self) -> Vec<i32> {
        self.paths
            .iter()
            .filter_map(|path| path.strip_prefix("request?seq="))
            .filter_map(|seq| seq.parse().ok())
            .collect()
    }

    fn handshake1(&mut self, body: &[u8]) -> HttpResponse {
        self.cipher = None;

        let Ok(local_seed) = Seed::try_from(body) else {
            return HttpResponse::new(400, Vec::new());
        };
        self.local_seed = Some(local_seed);

        let mut server_hash =
            handshake1_seed_auth_hash(&local_seed, &self.remote_seed, &self.auth_hash);
        match self.behavior {
            DeviceBehavior::FailHandshake1Status => return HttpResponse::new(500, Vec::new()),
            DeviceBehavior::TruncateHandshake1 => {
                return HttpResponse::new(200, self.remote_seed[..SEED_LEN / 2].to_vec());
            }
            DeviceBehavior::OmitServerHash => return HttpResponse::new(200, self.remote_seed),
            DeviceBehavior::TamperServerHash => server_hash[0] ^= 0x01,
            _ => {}
        }

        let mut response = self.remote_seed.to_vec();
        response.extend_from_slice(&server_hash);
        HttpResponse::new(200, response)
    }

    fn handshake2(&mut self, body: &[u8]) -> HttpResponse {
        let Some(local_seed) = self.local_seed else {
            return HttpResponse::new(400, Vec::new());
        };
        if self.behavior == DeviceBehavior::RejectHandshake2 {
            return HttpResponse::new(403, Vec::new());
        }

        let expected = handshake2_seed_auth_hash(&local_seed, &self.remote_seed, &self.auth_hash);
        if body != expected.as_slice() {
            return HttpResponse::new(403, Vec::new());
        }

        let seeds = SessionSeeds {
            local: local_seed,
            remote: self.remote_seed,
        };
        self.cipher = Some(KlapCipher::new(&seeds, &self.auth_hash));
        HttpResponse::new(200, Vec::new())
    }

    fn request(&mut self, seq: &str, body: &[u8]) -> HttpResponse {
        let Some(cipher) = &self.cipher else {
            return HttpResponse::new(403, Vec::new());
        };
        let Ok(seq) = seq.parse::<i32>() else {
            return HttpResponse::new(400, Vec::new());
        };
        let Ok(plaintext) = cipher.open(body, seq) else {
            return HttpResponse::new(400, Vec::new());
        };

        let reply = (self.handler)(&plaintext);
        let mut frame = cipher.seal(&reply, seq);
        if self.behavior == DeviceBehavior::TamperResponse {
            let last = frame.len() - 1;
            frame[last] ^= 0x80;
        }

        self.requests.push(plaintext);
        HttpResponse::new(200, frame)
    }
}

#[async_trait]
impl HttpTransport for SimulatedDevice {
    async fn post(
        &mut self,
        path: &str,
        _content_type: &str,
        body: &[u8],
    ) -> Result<HttpResponse, Error> {
        self.paths.push(path.to_string());
        self.frames.push(body.to_vec());

        let response = if path == HANDSHAKE1_PATH {
            self.handshake1(body)
        } else if path == HANDSHAKE2_PATH {
            self.handshake2(body)
        } else if let Some(seq) = path.strip_prefix("request?seq=") {
            self.request(seq, body)
        } else {
            HttpResponse::new(404, Vec::new())
        };
        Ok(response)
    }

    fn reset_session(&mut self) {
        self.resets += 1;
    }

    fn host(&self) -> &str {
        "simulated"
    }
}

/// Yields queued seeds, then fails with a randomness error.
pub(crate) struct FixedSeeds(VecDeque<Seed>);

impl FixedSeeds {
    pub(crate) fn new(seeds: impl IntoIterator<Item = Seed>) -> Self {
        Self(seeds.into_iter().collect())
    }
}

impl SeedSource for FixedSeeds {
    fn next_seed(&mut self) -> Result<Seed, Error> {
        self.0
            .pop_front()
            .ok_or_else(|| Error::Randomness("seed source exhausted".into()))
    }
}

/// Clock frozen at a fixed instant.
pub(crate) struct FixedClock(pub(crate) i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}
